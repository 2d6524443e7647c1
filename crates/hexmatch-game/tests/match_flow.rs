//! Integration tests for game sessions and the matchmaker.
//!
//! Players are real `Player` sessions over loopback sockets; the client
//! ends stay raw `TcpStream`s so tests can speak the wire protocol
//! directly and observe exactly which frames the relay produces.

use std::sync::Arc;
use std::time::Duration;

use hexmatch_game::{GameState, MatchConfig, Matchmaker, Metrics};
use hexmatch_protocol::{Frame, GameParams, Message, MessageType};
use hexmatch_session::Player;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// =========================================================================
// Helpers
// =========================================================================

/// Init timer parked far in the future — these tests place players
/// directly, so initialization never has to fire.
const QUIET_TIMER: Duration = Duration::from_secs(3600);

/// A config whose searching animation is effectively disabled, so waiting
/// players' sockets stay quiet unless a test opts in.
fn quiet_config() -> MatchConfig {
    MatchConfig {
        search_interval: Duration::from_secs(3600),
        ..MatchConfig::default()
    }
}

fn quiet_matchmaker() -> Arc<Matchmaker> {
    Matchmaker::new(quiet_config(), Arc::new(Metrics::new()))
}

async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (accepted, connected) =
        tokio::join!(listener.accept(), TcpStream::connect(addr));
    let (server, _) = accepted.expect("accept");
    (server, connected.expect("connect"))
}

/// Creates a listening `Player` whose display name is already set (via a
/// real inbound UpdateName frame), plus its raw client socket.
async fn new_player(name: &str) -> (Player, TcpStream) {
    let (server, mut client) = socket_pair().await;
    let player = Player::with_init_timeout(server, QUIET_TIMER);
    player.listen();

    client
        .write_all(&Message::update_name(name.as_bytes()).unwrap().encode())
        .await
        .unwrap();
    settle().await;
    assert_eq!(player.name(), name);

    (player, client)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

/// Reads whatever frames arrive on `client` until the stream goes quiet.
async fn drain_frames(client: &mut TcpStream) -> Vec<Message> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_millis(120), client.read(&mut chunk))
            .await
        {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let mut messages = Vec::new();
    let mut cursor = 0;
    while let Some(frame) = Frame::try_read(&buf[cursor..]).expect("well-formed stream") {
        messages.push(frame.to_message());
        cursor += frame.total_len();
    }
    messages
}

fn types_of(messages: &[Message]) -> Vec<MessageType> {
    messages.iter().map(|m| m.message_type()).collect()
}

// =========================================================================
// Pairing
// =========================================================================

#[tokio::test]
async fn test_first_player_waits_second_player_fills_the_session() {
    let mm = quiet_matchmaker();
    let (p1, mut c1) = new_player("alice").await;
    let (p2, _c2) = new_player("bob").await;

    let g1 = mm.place_player(p1).await;
    let info = g1.info().await.unwrap();
    assert_eq!(info.state, GameState::WaitingForPlayers);
    assert_eq!(info.player_count, 1);

    // The lone player is told the matchmaker is searching and shown as
    // unready.
    let frames = drain_frames(&mut c1).await;
    let types = types_of(&frames);
    assert!(types.contains(&MessageType::Connect), "got {types:?}");
    assert!(types.contains(&MessageType::Unready), "got {types:?}");
    let connect = frames
        .iter()
        .find(|m| m.message_type() == MessageType::Connect)
        .unwrap();
    assert_eq!(connect.payload_text(), "Searching");

    let g2 = mm.place_player(p2).await;
    assert_eq!(g2.game_id(), g1.game_id(), "second player joins the open session");
    let info = g1.info().await.unwrap();
    assert_eq!(info.player_count, 2);
}

#[tokio::test]
async fn test_matchmaker_holds_a_fresh_session_after_pairing() {
    let mm = quiet_matchmaker();
    let (p1, _c1) = new_player("alice").await;
    let (p2, _c2) = new_player("bob").await;

    let game = mm.place_player(p1).await;
    mm.place_player(p2).await;

    let open = mm.open_game().await;
    assert_ne!(open.game_id(), game.game_id());
    let info = open.info().await.unwrap();
    assert_eq!(info.state, GameState::WaitingForPlayers);
    assert_eq!(info.player_count, 0);
}

#[tokio::test]
async fn test_full_session_rejects_a_third_player() {
    let mm = quiet_matchmaker();
    let (p1, _c1) = new_player("alice").await;
    let (p2, _c2) = new_player("bob").await;
    let (p3, _c3) = new_player("carol").await;

    let game = mm.place_player(p1).await;
    mm.place_player(p2).await;

    let result = game.add_player(p3).await;
    assert!(result.is_err(), "a full session must refuse a third seat");
}

#[tokio::test]
async fn test_paired_players_learn_each_others_names() {
    let mm = quiet_matchmaker();
    let (p1, mut c1) = new_player("alice").await;
    let (p2, mut c2) = new_player("bob").await;

    mm.place_player(p1).await;
    mm.place_player(p2).await;
    settle().await;

    // First player: Connect("Searching") then UpdateName("bob").
    let names: Vec<String> = drain_frames(&mut c1)
        .await
        .iter()
        .filter(|m| {
            matches!(
                m.message_type(),
                MessageType::Connect | MessageType::UpdateName
            )
        })
        .map(|m| m.payload_text().into_owned())
        .collect();
    assert_eq!(names.last().map(String::as_str), Some("bob"), "got {names:?}");

    // Second player was announced their opponent straight away.
    let frames = drain_frames(&mut c2).await;
    let connect = frames
        .iter()
        .find(|m| m.message_type() == MessageType::Connect)
        .expect("second player gets a Connect");
    assert_eq!(connect.payload_text(), "alice");
    // And a mirror of the opponent's (not-)readiness.
    assert!(types_of(&frames).contains(&MessageType::Unready));
}

#[tokio::test]
async fn test_paired_players_sit_on_opposite_teams() {
    let mm = quiet_matchmaker();
    let (p1, _c1) = new_player("alice").await;
    let (p2, _c2) = new_player("bob").await;

    mm.place_player(p1.clone()).await;
    mm.place_player(p2.clone()).await;
    settle().await;

    assert_ne!(p1.team(), p2.team());
}

#[tokio::test]
async fn test_team_swap_keeps_teams_distinct() {
    let mm = quiet_matchmaker();
    let (p1, mut c1) = new_player("alice").await;
    let (p2, mut c2) = new_player("bob").await;

    mm.place_player(p1.clone()).await;
    mm.place_player(p2.clone()).await;
    settle().await;
    drain_frames(&mut c2).await;

    // Client 1 approves a team change: its own session flips on receive,
    // and the session flips (and notifies) the opponent.
    c1.write_all(&Message::approve_team_change().encode())
        .await
        .unwrap();
    settle().await;

    assert_ne!(p1.team(), p2.team(), "teams must stay distinct");
    let forwarded = drain_frames(&mut c2).await;
    assert!(types_of(&forwarded).contains(&MessageType::ApproveTeamChange));
}

#[tokio::test]
async fn test_concurrent_arrivals_never_share_a_seat() {
    let mm = quiet_matchmaker();

    // Build 20 players up front, then race all placements.
    let mut players = Vec::new();
    let mut clients = Vec::new(); // kept alive so nobody disconnects
    for i in 0..20 {
        let (player, client) = new_player(&format!("player-{i}")).await;
        players.push(player);
        clients.push(client);
    }

    let mut tasks = Vec::new();
    for player in players {
        let mm = Arc::clone(&mm);
        tasks.push(tokio::spawn(
            async move { mm.place_player(player).await.game_id() },
        ));
    }

    let mut placed = Vec::new();
    for task in tasks {
        placed.push(task.await.unwrap());
    }

    // 20 arrivals → 10 sessions, each with exactly two occupants.
    let mut counts = std::collections::HashMap::new();
    for game_id in placed {
        *counts.entry(game_id).or_insert(0usize) += 1;
    }
    assert_eq!(counts.len(), 10, "got {counts:?}");
    assert!(counts.values().all(|&n| n == 2), "got {counts:?}");
}

// =========================================================================
// Searching animation
// =========================================================================

#[tokio::test]
async fn test_searching_placeholder_rotates_for_a_lone_player() {
    let config = MatchConfig {
        search_interval: Duration::from_millis(50),
        ..MatchConfig::default()
    };
    let mm = Matchmaker::new(config, Arc::new(Metrics::new()));
    let (p1, mut c1) = new_player("alice").await;

    mm.place_player(p1).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let names: std::collections::HashSet<String> = drain_frames(&mut c1)
        .await
        .iter()
        .filter(|m| {
            matches!(
                m.message_type(),
                MessageType::Connect | MessageType::UpdateName
            )
        })
        .map(|m| m.payload_text().into_owned())
        .collect();

    assert!(
        names.len() >= 2,
        "animation should cycle through several frames, got {names:?}"
    );
    assert!(names.iter().all(|n| n.starts_with("Searching")), "got {names:?}");
}

// =========================================================================
// Readiness and match start
// =========================================================================

/// Pairs two named players through a fresh quiet matchmaker and drains
/// the pairing chatter from both client sockets.
async fn paired(
) -> (Arc<Matchmaker>, hexmatch_game::GameHandle, Player, TcpStream, Player, TcpStream)
{
    let mm = quiet_matchmaker();
    let (p1, mut c1) = new_player("alice").await;
    let (p2, mut c2) = new_player("bob").await;
    let game = mm.place_player(p1.clone()).await;
    mm.place_player(p2.clone()).await;
    settle().await;
    drain_frames(&mut c1).await;
    drain_frames(&mut c2).await;
    (mm, game, p1, c1, p2, c2)
}

#[tokio::test]
async fn test_one_ready_player_does_not_start_the_match() {
    let (_mm, game, _p1, mut c1, _p2, mut c2) = paired().await;

    c1.write_all(&Message::ready().encode()).await.unwrap();
    settle().await;

    assert_eq!(game.info().await.unwrap().state, GameState::WaitingForPlayers);
    // The opponent hears about the readiness, but no StartMatch.
    let frames = drain_frames(&mut c2).await;
    assert!(types_of(&frames).contains(&MessageType::Ready));
    assert!(!types_of(&frames).contains(&MessageType::StartMatch));
    let frames = drain_frames(&mut c1).await;
    assert!(!types_of(&frames).contains(&MessageType::StartMatch));
}

#[tokio::test]
async fn test_both_ready_starts_the_match() {
    let (mm, game, p1, mut c1, p2, mut c2) = paired().await;

    c1.write_all(&Message::ready().encode()).await.unwrap();
    c2.write_all(&Message::ready().encode()).await.unwrap();
    settle().await;

    assert_eq!(game.info().await.unwrap().state, GameState::Playing);
    assert_eq!(mm.metrics().active_games(), 1);

    // Each side gets match parameters carrying its own team.
    for (client, player) in [(&mut c1, &p1), (&mut c2, &p2)] {
        let frames = drain_frames(client).await;
        let start = frames
            .iter()
            .find(|m| m.message_type() == MessageType::StartMatch)
            .expect("StartMatch must arrive");
        let params = GameParams::from_bytes(start.payload()).expect("valid params");
        assert_eq!(params.local_team, player.team());
        assert_eq!(params.timer_duration, 0.0);
        assert!(params.show_clock);
    }
}

#[tokio::test]
async fn test_unready_before_opponent_readies_blocks_the_start() {
    let (_mm, game, _p1, mut c1, _p2, mut c2) = paired().await;

    c1.write_all(&Message::ready().encode()).await.unwrap();
    settle().await;
    c1.write_all(&Message::unready().encode()).await.unwrap();
    settle().await;
    c2.write_all(&Message::ready().encode()).await.unwrap();
    settle().await;

    assert_eq!(game.info().await.unwrap().state, GameState::WaitingForPlayers);
}

#[tokio::test]
async fn test_ready_indicator_decorates_announced_names() {
    let config = MatchConfig {
        search_interval: Duration::from_secs(3600),
        show_ready_in_name: true,
        ..MatchConfig::default()
    };
    let mm = Matchmaker::new(config, Arc::new(Metrics::new()));
    let (p1, mut c1) = new_player("alice").await;
    let (p2, mut c2) = new_player("bob").await;
    mm.place_player(p1).await;
    mm.place_player(p2).await;
    settle().await;
    drain_frames(&mut c1).await;
    drain_frames(&mut c2).await;

    // Alice readies: bob's announced opponent name flips to "+alice".
    c1.write_all(&Message::ready().encode()).await.unwrap();
    settle().await;

    let names: Vec<String> = drain_frames(&mut c2)
        .await
        .iter()
        .filter(|m| m.message_type() == MessageType::UpdateName)
        .map(|m| m.payload_text().into_owned())
        .collect();
    assert_eq!(
        names.last().map(String::as_str),
        Some("+alice"),
        "got {names:?}"
    );
}

#[tokio::test]
async fn test_timer_configuration_forces_clock_off_in_params() {
    let config = MatchConfig {
        search_interval: Duration::from_secs(3600),
        timer_duration: 300.0,
        show_clock: true,
        ..MatchConfig::default()
    };
    let mm = Matchmaker::new(config, Arc::new(Metrics::new()));
    let (p1, mut c1) = new_player("alice").await;
    let (p2, mut c2) = new_player("bob").await;
    mm.place_player(p1).await;
    mm.place_player(p2).await;
    settle().await;
    drain_frames(&mut c1).await;
    drain_frames(&mut c2).await;

    c1.write_all(&Message::ready().encode()).await.unwrap();
    c2.write_all(&Message::ready().encode()).await.unwrap();
    settle().await;

    let frames = drain_frames(&mut c1).await;
    let start = frames
        .iter()
        .find(|m| m.message_type() == MessageType::StartMatch)
        .expect("StartMatch must arrive");
    let params = GameParams::from_bytes(start.payload()).unwrap();
    assert_eq!(params.timer_duration, 300.0);
    assert!(!params.show_clock, "running timer replaces the clock");
}

// =========================================================================
// Relaying during a match
// =========================================================================

/// Pairs two players and takes the session to `Playing`.
async fn playing(
) -> (Arc<Matchmaker>, hexmatch_game::GameHandle, Player, TcpStream, Player, TcpStream)
{
    let (mm, game, p1, mut c1, p2, mut c2) = paired().await;
    c1.write_all(&Message::ready().encode()).await.unwrap();
    c2.write_all(&Message::ready().encode()).await.unwrap();
    settle().await;
    drain_frames(&mut c1).await;
    drain_frames(&mut c2).await;
    assert_eq!(game.info().await.unwrap().state, GameState::Playing);
    (mm, game, p1, c1, p2, c2)
}

#[tokio::test]
async fn test_board_state_is_forwarded_verbatim() {
    let (_mm, _game, _p1, mut c1, _p2, mut c2) = playing().await;

    let board = Message::with_payload(MessageType::BoardState, b"fen:abc123".to_vec())
        .unwrap();
    c1.write_all(&board.encode()).await.unwrap();
    settle().await;

    let frames = drain_frames(&mut c2).await;
    let forwarded = frames
        .iter()
        .find(|m| m.message_type() == MessageType::BoardState)
        .expect("board state must be forwarded");
    assert_eq!(forwarded.payload(), b"fen:abc123");
}

#[tokio::test]
async fn test_ping_is_answered_with_pong_not_forwarded() {
    let (_mm, _game, _p1, mut c1, _p2, mut c2) = playing().await;

    c1.write_all(&Message::ping().encode()).await.unwrap();
    settle().await;

    let own = drain_frames(&mut c1).await;
    assert!(types_of(&own).contains(&MessageType::Pong));
    let others = drain_frames(&mut c2).await;
    assert!(!types_of(&others).contains(&MessageType::Ping));
}

#[tokio::test]
async fn test_unknown_message_type_is_forwarded_best_effort() {
    let (_mm, _game, _p1, mut c1, _p2, mut c2) = playing().await;

    // A tag from a newer client build: 8-byte header with tag 99.
    let mut frame = Message::ping().encode();
    frame[7] = 99;
    c1.write_all(&frame).await.unwrap();
    settle().await;

    let frames = drain_frames(&mut c2).await;
    assert!(
        types_of(&frames).contains(&MessageType::Unknown(99)),
        "got {:?}",
        types_of(&frames)
    );
}

#[tokio::test]
async fn test_checkmate_completes_the_session_and_is_forwarded() {
    let (mm, game, _p1, mut c1, _p2, mut c2) = playing().await;

    c1.write_all(&Message::control(MessageType::Checkmate).encode())
        .await
        .unwrap();
    settle().await;

    assert_eq!(game.info().await.unwrap().state, GameState::Complete);
    assert_eq!(mm.metrics().active_games(), 0);
    let frames = drain_frames(&mut c2).await;
    assert!(types_of(&frames).contains(&MessageType::Checkmate));
}

#[tokio::test]
async fn test_surrender_is_forwarded_with_its_timestamp() {
    let (_mm, game, _p1, mut c1, _p2, mut c2) = playing().await;

    c1.write_all(&Message::surrender(12.5).unwrap().encode())
        .await
        .unwrap();
    settle().await;

    assert_eq!(game.info().await.unwrap().state, GameState::Complete);
    let frames = drain_frames(&mut c2).await;
    let surrender = frames
        .iter()
        .find(|m| m.message_type() == MessageType::Surrender)
        .expect("surrender must be forwarded");
    let when: f32 = serde_json::from_slice(surrender.payload()).unwrap();
    assert_eq!(when, 12.5);
}

#[tokio::test]
async fn test_surrender_in_the_lobby_force_ends_the_session() {
    let mm = quiet_matchmaker();
    let (p1, mut c1) = new_player("alice").await;

    let game = mm.place_player(p1.clone()).await;
    settle().await;
    drain_frames(&mut c1).await;

    c1.write_all(&Message::surrender(0.0).unwrap().encode())
        .await
        .unwrap();
    settle().await;

    assert!(p1.is_closed(), "anomalous surrender closes the connection");
    let open = mm.open_game().await;
    assert_ne!(
        open.game_id(),
        game.game_id(),
        "force-ended session must be replaced in the matchmaker"
    );
}

// =========================================================================
// Disconnects
// =========================================================================

#[tokio::test]
async fn test_mid_match_disconnect_delivers_a_forfeit_surrender() {
    let (_mm, game, _p1, c1, _p2, mut c2) = playing().await;

    drop(c1); // abrupt disconnect, no Disconnect frame
    settle().await;

    assert_eq!(game.info().await.unwrap().state, GameState::Complete);
    let frames = drain_frames(&mut c2).await;
    let surrender = frames
        .iter()
        .find(|m| m.message_type() == MessageType::Surrender)
        .expect("survivor must be told they won by forfeit");
    assert_eq!(surrender.message_type().tag(), 10);
}

#[tokio::test]
async fn test_lobby_disconnect_requeues_the_survivor() {
    let (mm, game, _p1, c1, p2, mut c2) = paired().await;

    drop(c1); // opponent vanishes before anyone readied
    settle().await;
    settle().await; // let the re-queue command flow through the dispatcher

    assert_eq!(game.info().await.unwrap().state, GameState::Complete);

    // The survivor now occupies the open session as its first player.
    let open = mm.open_game().await;
    let info = open.info().await.unwrap();
    assert_eq!(info.player_count, 1);
    assert_eq!(info.state, GameState::WaitingForPlayers);
    assert!(!p2.is_closed(), "survivor stays connected");

    // And is back to seeing the searching placeholder.
    let names: Vec<String> = drain_frames(&mut c2)
        .await
        .iter()
        .filter(|m| {
            matches!(
                m.message_type(),
                MessageType::Connect | MessageType::UpdateName
            )
        })
        .map(|m| m.payload_text().into_owned())
        .collect();
    assert_eq!(
        names.last().map(String::as_str),
        Some("Searching"),
        "got {names:?}"
    );
}

#[tokio::test]
async fn test_client_disconnect_frame_is_forwarded_then_connection_closed() {
    let (_mm, game, p1, mut c1, _p2, mut c2) = playing().await;

    c1.write_all(&Message::control(MessageType::Disconnect).encode())
        .await
        .unwrap();
    settle().await;

    assert!(p1.is_closed());
    assert_eq!(game.info().await.unwrap().state, GameState::Complete);
    let frames = drain_frames(&mut c2).await;
    assert!(types_of(&frames).contains(&MessageType::Disconnect));
}
