use std::env;

use serde_json::json;
use tracing::{error, info};

use roomsub::config::load_config;
use roomsub::session::{Session, SessionCallbacks};
use roomsub::utils::logging;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init("info");

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return;
        }
    };

    let room_id = env::args().nth(1).unwrap_or_else(|| "lobby".to_string());
    info!("joining room {room_id} via {}", settings.broker.url);

    let session = Session::websocket(settings);
    let room = room_id.clone();
    let subscriber = session.clone();
    session.connect(
        SessionCallbacks::new()
            .on_connect(move || {
                subscriber.subscribe_room(&room, |event| info!("room event: {event}"));
                subscriber.send(
                    &format!("/app/rooms/{room}/join"),
                    &json!({ "user": "roomsub-cli" }),
                );
            })
            .on_disconnect(|| info!("broker ended the session"))
            .on_error(|e| error!("session fault: {e}")),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown: {e}");
    }
    info!("shutting down");
    session.disconnect();
}
