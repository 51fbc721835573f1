mod common;

use common::{find, launch, profile, seeded_gateway, signed_in_gateway, test_config, wait_for_agent};
use filter_sync::bus::{FailureKind, SessionId, TabId};
use filter_sync::config::Config;
use filter_sync::coordinator::ResolutionOutcome;
use filter_sync::engine::TagList;
use filter_sync::gateway::{FileGateway, USER_KEY};
use filter_sync::init::Runtime;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_popup_editor_flow() {
    let runtime = launch(test_config(), seeded_gateway(&[])).await;
    let popup = runtime.open_popup(SessionId(1)).await.unwrap();

    assert!(popup.begin_edit(None).await);
    // Empty name is caught before anything is sent
    let err = popup.save_draft().await.unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Validation));

    popup
        .edit_draft(|draft| {
            draft.name = "Focus".to_string();
            draft.add_tag(TagList::Blacklist, "gaming");
            draft.is_default = true;
            draft.allowed_websites.clear();
        })
        .await;
    // Default profiles need a site; the draft survives the rejection
    let err = popup.save_draft().await.unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Validation));
    let view = popup.view().await;
    let editor = view.editor.as_ref().unwrap();
    assert_eq!(editor.draft.name, "Focus");
    assert!(view.last_error.is_some());

    popup
        .edit_draft(|draft| {
            draft.toggle_website("https://www.youtube.com/");
        })
        .await;
    assert!(popup.save_draft().await.unwrap());
    let view = popup.view().await;
    assert!(view.editor.is_none());
    assert!(view.last_error.is_none());
    assert_eq!(view.profiles.len(), 1);
    assert_eq!(view.profiles[0].allowed_websites, vec!["youtube.com".to_string()]);

    // Editing then resetting discards changes
    assert!(popup.begin_edit(Some("Focus")).await);
    popup.edit_draft(|draft| draft.colour = "#000".to_string()).await;
    popup.reset_draft().await;
    let editor = popup.view().await.editor.unwrap();
    assert!(!editor.is_dirty());
    assert!(!popup.begin_edit(Some("Missing")).await);

    popup.close().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_stale_popup_resyncs_after_not_found() {
    let runtime = launch(
        test_config(),
        seeded_gateway(&[profile("A", &[], false, true), profile("B", &[], false, true)]),
    )
    .await;
    let popup = runtime.open_popup(SessionId(1)).await.unwrap();
    let other = runtime.open_popup(SessionId(2)).await.unwrap();

    other.delete_profile("A").await.unwrap();
    assert_eq!(popup.view().await.profiles.len(), 2);

    let err = popup.toggle_profile("A").await.unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::NotFound));
    let view = popup.view().await;
    assert_eq!(view.profiles.len(), 1);
    assert_eq!(view.profiles[0].name, "B");

    other.close().await;
    popup.close().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_popup_open_selects_site_profile() {
    let runtime = launch(
        test_config(),
        seeded_gateway(&[
            profile("Social", &["reddit.com"], true, true),
            profile("Video", &["youtube.com"], true, false),
        ]),
    )
    .await;
    let (_agent, _listener) = runtime.attach_agent(TabId(1), "old.reddit.com").await;
    wait_for_agent(runtime.coordinator(), TabId(1)).await;
    runtime
        .activate_tab(TabId(1), "https://old.reddit.com/r/rust")
        .await
        .unwrap();

    let popup = runtime.open_popup(SessionId(1)).await.unwrap();
    let view = popup.view().await;
    assert_eq!(
        view.resolution,
        Some(ResolutionOutcome::AlreadyApplied {
            profile: "Social".to_string()
        })
    );

    let profiles = popup.toggle_default_group().await.unwrap();
    assert!(profiles.iter().all(|p| !p.is_enabled));
    let profiles = popup.toggle_default_group().await.unwrap();
    assert!(find(&profiles, "Social").is_enabled);
    assert!(!find(&profiles, "Video").is_enabled);

    popup.close().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_signed_in_user_in_snapshot() {
    let runtime = launch(test_config(), signed_in_gateway("premium")).await;

    let popup = runtime.open_popup(SessionId(1)).await.unwrap();
    let user = popup.view().await.user.unwrap();
    assert_eq!(user.email, "a@example.com");
    assert!(user.is_premium());

    popup.close().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_customization_is_premium_only() {
    let runtime = launch(test_config(), signed_in_gateway("free")).await;
    let popup = runtime.open_popup(SessionId(1)).await.unwrap();
    let view = popup.view().await;
    assert!(view.user.is_some());
    assert!(view.customization_locked());

    let mut settings = view.settings;
    settings.customization_toggle = true;
    settings.show_block_counter = false;
    let saved = popup.save_settings(settings).await.unwrap();
    assert!(!saved.customization_toggle);
    assert!(!saved.show_block_counter);
    assert!(!runtime.coordinator().settings().customization_toggle);

    popup.close().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_sign_out_drops_premium_settings() {
    let gateway = signed_in_gateway("premium");
    let runtime = launch(test_config(), gateway.clone()).await;
    let popup = runtime.open_popup(SessionId(1)).await.unwrap();
    assert!(!popup.view().await.customization_locked());

    let mut settings = popup.view().await.settings;
    settings.customization_toggle = true;
    assert!(popup.save_settings(settings).await.unwrap().customization_toggle);

    let settings = popup.sign_out().await.unwrap();
    assert!(!settings.customization_toggle);
    let view = popup.view().await;
    assert!(view.user.is_none());
    assert!(view.customization_locked());
    assert!(!view.settings.customization_toggle);
    assert!(gateway.value(USER_KEY).await.is_none());
    assert!(runtime.coordinator().snapshot(None).await.user.is_none());

    popup.close().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let mut config: Config = test_config();
    config.storage.path = path.to_string_lossy().into_owned();

    let gateway = Arc::new(FileGateway::open(&path).await.unwrap());
    let runtime = Runtime::launch(config.clone(), gateway).await.unwrap();
    let popup = runtime.open_popup(SessionId(1)).await.unwrap();
    popup.begin_edit(None).await;
    popup
        .edit_draft(|draft| draft.name = "Evening".to_string())
        .await;
    popup.save_draft().await.unwrap();
    popup.toggle_extension(false).await.unwrap();
    popup.close().await;
    runtime.shutdown().await;

    let gateway = Arc::new(FileGateway::open(&path).await.unwrap());
    let runtime = Runtime::launch(config, gateway).await.unwrap();
    let profiles = runtime.coordinator().profiles().await;
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].name, "Evening");
    assert!(!runtime.coordinator().settings().extension_enabled);
    runtime.shutdown().await;
}
