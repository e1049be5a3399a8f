#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use bloner_core::protocol::{
    Card, Envelope, GameState, LobbyId, PlayerId, PlayerLeft, TeamState, TurnInfo, TurnType,
};
use bloner_relay::app_state::AppState;
use bloner_relay::config::{DisconnectPolicy, RelayConfig};
use common::{app, eventually, full_match};
use serde_json::{json, Map};

fn snapshot(from: PlayerId, active: i64) -> GameState {
    let mut extra = Map::new();
    extra.insert("dealer".into(), json!(3));
    GameState {
        player_id: from,
        active_player: active,
        trump_draw_id: 17,
        trump_suit: 2,
        draw_pile: vec![Card { suit: 1, number: 9 }],
        play_pile: vec![],
        team_state: [TeamState(json!({"score": 0})), TeamState(json!({"score": 1}))],
        extra,
    }
}

fn card_play(from: PlayerId) -> TurnInfo {
    TurnInfo {
        player_id: from,
        turn_type: TurnType::CardPlay,
        trump_pick: false,
        trump_discard: Card::NONE,
        card_play: Card { suit: 0, number: 5 },
        extra: Map::new(),
    }
}

#[tokio::test]
async fn state_res_reaches_all_four_including_sender() {
    let app = app();
    let (mut clients, ids) = full_match(&app, LobbyId(7)).await;

    let state = snapshot(ids[0], 2);
    clients[0].send(&Envelope::StateRes(state.clone())).await;
    for c in clients.iter_mut() {
        match c.recv().await {
            Envelope::StateRes(got) => {
                assert_eq!(got.active_player, 2);
                assert_eq!(got.extra.get("dealer"), Some(&json!(3)));
                assert_eq!(got, state);
            }
            other => panic!("expected state_res, got {other:?}"),
        }
    }
    assert_eq!(app.metrics().messages_routed.get(&[("type", "state_res")]), 1);
}

#[tokio::test]
async fn turn_info_from_any_seat_is_broadcast() {
    let app = app();
    let (mut clients, ids) = full_match(&app, LobbyId(1)).await;

    clients[2].send(&Envelope::TurnInfo(card_play(ids[2]))).await;
    for c in clients.iter_mut() {
        assert_eq!(c.recv().await, Envelope::TurnInfo(card_play(ids[2])));
    }
}

#[tokio::test]
async fn remaining_players_keep_playing_after_a_disconnect() {
    let app = app();
    let (mut clients, ids) = full_match(&app, LobbyId(9)).await;

    drop(clients.pop());
    for c in clients.iter_mut() {
        assert_eq!(c.recv().await, Envelope::PlayerLeft(PlayerLeft { player_id: ids[3] }));
    }

    clients[1].send(&Envelope::TurnInfo(card_play(ids[1]))).await;
    for c in clients.iter_mut() {
        assert_eq!(c.recv().await, Envelope::TurnInfo(card_play(ids[1])));
    }
    assert_eq!(app.registry().active_matches(), 1);
}

#[tokio::test]
async fn match_ends_when_everyone_is_gone() {
    let app = app();
    let (clients, _ids) = full_match(&app, LobbyId(2)).await;
    drop(clients);

    assert!(eventually(|| app.registry().active_matches() == 0).await);
    assert_eq!(
        app.metrics().matches_ended.get(&[("outcome", "all_disconnected")]),
        1
    );
}

#[tokio::test]
async fn malformed_line_mid_match_is_not_fatal() {
    let app = app();
    let (mut clients, ids) = full_match(&app, LobbyId(4)).await;

    clients[3].send_raw(b"{\"type\":\"turn_info\",\"data\":{\"playerId\":1}}\n").await;
    match clients[3].recv().await {
        Envelope::Error(body) => assert_eq!(body.code, "BAD_REQUEST"),
        other => panic!("expected error, got {other:?}"),
    }

    clients[3].send(&Envelope::TurnInfo(card_play(ids[3]))).await;
    for c in clients.iter_mut() {
        assert_eq!(c.recv().await, Envelope::TurnInfo(card_play(ids[3])));
    }
}

#[tokio::test]
async fn lobby_req_mid_match_is_rejected() {
    let app = app();
    let (mut clients, _ids) = full_match(&app, LobbyId(6)).await;

    clients[1].send(&Envelope::LobbyReq(LobbyId(6))).await;
    match clients[1].recv().await {
        Envelope::Error(body) => assert_eq!(body.code, "NOT_ALLOWED"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(app.metrics().protocol_errors.get(&[("phase", "match")]), 1);
    assert!(app.registry().lobby_members(LobbyId(6)).is_none());
}

#[tokio::test]
async fn abandon_policy_closes_the_table() {
    let mut cfg = RelayConfig::default();
    cfg.match_.on_disconnect = DisconnectPolicy::Abandon;
    let app = AppState::new(cfg);
    let (mut clients, ids) = full_match(&app, LobbyId(5)).await;

    drop(clients.remove(0));
    for c in clients.iter_mut() {
        assert_eq!(c.recv().await, Envelope::PlayerLeft(PlayerLeft { player_id: ids[0] }));
        c.expect_closed().await;
    }
    let metrics = app.metrics();
    assert!(eventually(|| metrics.matches_ended.get(&[("outcome", "abandoned")]) == 1).await);
}

#[tokio::test]
async fn shutdown_cancels_running_matches() {
    let app = app();
    let (mut clients, _ids) = full_match(&app, LobbyId(3)).await;

    app.begin_shutdown();
    for c in clients.iter_mut() {
        c.expect_closed().await;
    }
    let metrics = app.metrics();
    assert!(eventually(|| metrics.matches_ended.get(&[("outcome", "cancelled")]) == 1).await);
}
