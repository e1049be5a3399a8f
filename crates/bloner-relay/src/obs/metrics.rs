//! Minimal metrics registry for the relay.
//!
//! Counter/gauge types with dynamic labels backed by `DashMap`. Labels are
//! flattened into sorted key vectors to keep rendering deterministic.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn label_str(key: &[(String, String)]) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for one label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        let mut rows: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|r| (label_str(r.key()), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (labels, val) in rows {
            let _ = writeln!(out, "{}{{{}}} {}", name, labels, val);
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<Vec<(String, String)>, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }
    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        let gauge = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} gauge", name);
        let mut rows: Vec<(String, i64)> = self
            .map
            .iter()
            .map(|r| (label_str(r.key()), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (labels, val) in rows {
            let _ = writeln!(out, "{}{{{}}} {}", name, labels, val);
        }
    }
}

#[derive(Default)]
pub struct RelayMetrics {
    pub connections_accepted: CounterVec,
    pub connections_active: GaugeVec,
    pub decode_errors: CounterVec,
    pub protocol_errors: CounterVec,
    pub messages_routed: CounterVec,
    pub outbound_dropped: CounterVec,
    pub matches_started: CounterVec,
    pub matches_ended: CounterVec,
    draining: AtomicBool,
}

impl RelayMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render all metrics plus caller-provided gauge lines (registry sizes).
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.connections_accepted.render("bloner_connections_accepted_total", &mut out);
        self.connections_active.render("bloner_connections_active", &mut out);
        self.decode_errors.render("bloner_decode_errors_total", &mut out);
        self.protocol_errors.render("bloner_protocol_errors_total", &mut out);
        self.messages_routed.render("bloner_messages_routed_total", &mut out);
        self.outbound_dropped.render("bloner_outbound_dropped_total", &mut out);
        self.matches_started.render("bloner_matches_started_total", &mut out);
        self.matches_ended.render("bloner_matches_ended_total", &mut out);

        let _ = writeln!(
            out,
            "# TYPE bloner_draining gauge\nbloner_draining {}",
            if self.is_draining() { 1 } else { 0 }
        );
        for (k, v) in extra {
            let _ = writeln!(out, "# TYPE {} gauge\n{} {}", k, k, v);
        }
        out
    }
}
