#![allow(dead_code)]

use std::time::Duration;

use bloner_core::protocol::{decode, encode, Envelope, LobbyAssign, LobbyId, PlayerId};
use bloner_relay::app_state::AppState;
use bloner_relay::config::RelayConfig;
use bloner_relay::dispatch::serve_connection;
use bloner_relay::transport::lines;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn app() -> AppState {
    AppState::new(RelayConfig::default())
}

/// In-memory client wired straight into the pre-match task.
pub struct TestClient {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

pub fn connect(app: &AppState) -> TestClient {
    let (server, client) = tokio::io::duplex(64 * 1024);
    let (ls, sink) = lines::split(server, app.cfg().relay.max_line_bytes);
    tokio::spawn(serve_connection(
        app.registry(),
        ls,
        sink,
        app.endpoint_options("test"),
        app.shutdown_signal(),
    ));
    let (r, w) = tokio::io::split(client);
    TestClient {
        reader: BufReader::new(r),
        writer: w,
    }
}

impl TestClient {
    pub async fn send(&mut self, env: &Envelope) {
        let line = encode(env).unwrap();
        self.writer.write_all(&line).await.unwrap();
    }

    pub async fn send_raw(&mut self, raw: &[u8]) {
        self.writer.write_all(raw).await.unwrap();
    }

    /// Next line, or `None` once the relay closed the stream.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for the relay")
            .unwrap();
        (n > 0).then_some(line)
    }

    pub async fn recv(&mut self) -> Envelope {
        let line = self.recv_line().await.expect("relay closed the stream");
        decode(line.as_bytes()).unwrap()
    }

    pub async fn expect_closed(&mut self) {
        assert_eq!(self.recv_line().await, None);
    }

    /// Send `lobby_req` and wait for the assignment.
    pub async fn join(&mut self, lobby: LobbyId) -> LobbyAssign {
        self.send(&Envelope::LobbyReq(lobby)).await;
        match self.recv().await {
            Envelope::LobbyAssign(assign) => assign,
            other => panic!("expected lobby_assign, got {other:?}"),
        }
    }
}

/// Four clients in one lobby, joined in order, with `game_start` (and the
/// authoritative `state_req`) already consumed.
pub async fn full_match(app: &AppState, lobby: LobbyId) -> (Vec<TestClient>, Vec<PlayerId>) {
    let mut clients = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..4 {
        let mut c = connect(app);
        ids.push(c.join(lobby).await.player_id);
        clients.push(c);
    }
    for c in clients.iter_mut() {
        assert_eq!(c.recv().await, Envelope::GameStart(ids.clone()));
    }
    assert_eq!(clients[0].recv().await, Envelope::StateReq);
    (clients, ids)
}

/// Poll `cond` until it holds or `WAIT` elapses.
pub async fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
