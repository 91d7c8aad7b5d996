pub mod error;
pub mod map;
pub mod messaging;
pub mod resources;
pub mod session;
pub mod settings;
pub mod state;
pub mod storage;
pub mod types;

use error::{AppError, ErrorPayload, LocationError};
use map::NoLocation;
use state::AppState;

/// Demo runner: sign in, then follow the mobile clinic until it arrives.
///
/// There is no device location source outside a browser, so the tracker
/// always starts from the configured fallback location.
pub fn run(email: &str) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return;
        }
    };

    if let Err(e) = runtime.block_on(track_clinic(email)) {
        let payload = ErrorPayload::from(&e);
        log::error!("{} ({})", payload.message, payload.recovery_suggestion);
        if let Ok(json) = serde_json::to_string(&payload) {
            log::debug!("Error payload: {}", json);
        }
    }
}

async fn track_clinic(email: &str) -> Result<(), AppError> {
    let config = state::load_config().map_err(AppError::Configuration)?;
    let state = AppState::new(config)?;

    let user = state.resume_or_sign_in(email, "").await?;
    let settings = state.settings.snapshot()?;
    log::info!(
        "Welcome, {} (language: {}, location sharing: {})",
        user.name,
        settings.language,
        if settings.share_location { "on" } else { "off" }
    );

    let unread = state
        .messaging
        .visible_conversations(&user.id)
        .iter()
        .filter(|c| {
            c.unread.is_some_and(|n| n > 0)
                && c.last_message_sender_id.as_deref() != Some(user.id.as_str())
        })
        .count();
    if unread > 0 {
        log::info!("{} conversation(s) with unread messages", unread);
    }

    for clinic in resources::clinic_schedule() {
        log::info!(
            "Today: {} at {}, {}{}",
            clinic.name,
            clinic.location,
            clinic.hours,
            if clinic.tracking { " (live)" } else { "" }
        );
    }

    let provider = NoLocation(LocationError::Unsupported);
    let mut handle = state.start_tracker(&provider).await?;
    let status = handle.status();
    log::info!(
        "Mobile clinic is {:.1} miles away, ETA {} minutes",
        status.distance_remaining,
        status.eta_minutes
    );

    while let Some(status) = handle.changed().await {
        log::info!(
            "Mobile clinic: {:.1} mi, ETA {} min ({:.5}, {:.5})",
            status.distance_remaining,
            status.eta_minutes,
            status.clinic_position.latitude,
            status.clinic_position.longitude
        );
        if !status.running {
            break;
        }
    }
    handle.wait().await;
    log::info!("Mobile clinic has arrived");
    Ok(())
}
