//! Security tests: hijack detection, session fixation and corrupt records.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration;
use common::{Browser, CURL, FIREFOX, Server};
use hardened_sessions::state::METADATA_KEY;
use hardened_sessions::{
    ClientSignals, SessionError, SessionHandler, SessionId, SessionManagerConfig, SessionStart,
};
use proptest::prelude::*;

/// Steal every cookie of `victim` into a client with a different user agent.
fn steal_cookies(victim: &Browser) -> Browser {
    let mut thief = victim.clone();
    thief.signals = ClientSignals::new(Some(CURL), None, None);
    thief
}

#[tokio::test]
async fn test_fingerprint_mismatch_invalidates_and_notifies_gc() {
    let server = Server::new(SessionManagerConfig::default(), true);
    let mut victim = Browser::new(FIREFOX);

    let (mut session, jar) = server.request(&victim);
    session.start_session().await.unwrap();
    session.insert("role", "admin").unwrap();
    let id = session.session_id().unwrap().clone();
    session.commit_session().await.unwrap();
    victim.absorb(&jar);

    server.clock.advance(Duration::seconds(20));
    let thief = steal_cookies(&victim);
    let (mut session, _) = server.request(&thief);
    assert_eq!(session.start_session().await.unwrap(), SessionStart::Invalidated);
    assert!(!session.is_started());
    assert_eq!(session.get::<String>("role").unwrap_err(), SessionError::NotStarted);

    assert!(!server.backend.validate_id(&id).await.unwrap());
    assert_eq!(
        server.callbacks.gc_notifications().unwrap(),
        vec![(id, server.now())]
    );

    // The hijacked session is gone for the victim as well.
    let (mut session, _) = server.request(&victim);
    assert_eq!(session.start_session().await.unwrap(), SessionStart::Initialized);
    assert_eq!(session.get::<String>("role").unwrap(), None);
}

#[tokio::test]
async fn test_fingerprint_checked_before_forwarding() {
    let server = Server::new(SessionManagerConfig::default(), false);
    let mut victim = Browser::new(FIREFOX);

    let (mut session, jar) = server.request(&victim);
    session.start_session().await.unwrap();
    let old_id = session.session_id().unwrap().clone();
    session.commit_session().await.unwrap();
    victim.absorb(&jar);
    let thief = steal_cookies(&victim);

    let (mut session, jar) = server.request(&victim);
    session.start_session().await.unwrap();
    let new_id = session.regenerate_id().await.unwrap();
    session.commit_session().await.unwrap();
    victim.absorb(&jar);

    server.clock.advance(Duration::seconds(5));
    let (mut session, _) = server.request(&thief);
    assert_eq!(session.start_session().await.unwrap(), SessionStart::Invalidated);
    assert!(!server.backend.validate_id(&old_id).await.unwrap());
    // The live session is untouched.
    assert!(server.backend.validate_id(&new_id).await.unwrap());
}

#[tokio::test]
async fn test_planted_identifier_is_not_adopted() {
    let server = Server::new(SessionManagerConfig::default(), true);
    let planted = SessionId::generate();
    let mut victim = Browser::new(FIREFOX);
    victim.set_cookie("SESSIONID", planted.as_str());

    let (mut session, jar) = server.request(&victim);
    assert_eq!(session.start_session().await.unwrap(), SessionStart::Initialized);
    session.commit_session().await.unwrap();
    victim.absorb(&jar);

    let issued = victim.session_id().unwrap();
    assert_ne!(issued, planted);
    assert!(!server.backend.validate_id(&planted).await.unwrap());
    assert!(server.backend.validate_id(&issued).await.unwrap());
}

#[tokio::test]
async fn test_malformed_identifier_is_replaced() {
    let server = Server::new(SessionManagerConfig::default(), false);
    let legacy_hex = "f".repeat(64);
    for presented in ["../../etc/passwd", "", "ABC", legacy_hex.as_str()] {
        let mut browser = Browser::new(FIREFOX);
        browser.set_cookie("SESSIONID", presented);

        let (mut session, jar) = server.request(&browser);
        assert_eq!(session.start_session().await.unwrap(), SessionStart::Initialized);
        session.commit_session().await.unwrap();
        browser.absorb(&jar);

        assert!(browser.session_id().is_some());
    }
}

#[tokio::test]
async fn test_record_without_metadata_is_fatal() {
    let server = Server::new(SessionManagerConfig::default(), false);
    let id = SessionId::generate();
    server.backend.write(&id, br#"{"user":"mallory"}"#).await.unwrap();

    let mut browser = Browser::new(FIREFOX);
    browser.set_cookie("SESSIONID", id.as_str());
    let (mut session, _) = server.request(&browser);

    let err = session.start_session().await.unwrap_err();
    assert!(err.is_integrity_failure());
    assert_eq!(
        err,
        SessionError::MetadataMissing {
            session_id: id.to_string()
        }
    );
    assert!(!session.is_started());
    assert!(server.callbacks.gc_notifications().unwrap().is_empty());
}

#[tokio::test]
async fn test_forged_forwarding_metadata_cannot_extend_window() {
    let server = Server::new(SessionManagerConfig::default(), false);
    let browser = Browser::new(FIREFOX);
    let id = SessionId::generate();

    // Inactive record whose window has already closed.
    let record = serde_json::json!({
        METADATA_KEY: {
            "instantiated_at": server.now() - Duration::minutes(10),
            "regenerate_id_at": null,
            "session_start_count": 3,
            "is_active": false,
            "expire_data_at": server.now() - Duration::seconds(1),
            "forward_to_session_id": SessionId::generate(),
            "fingerprint": browser.signals.fingerprint(),
        }
    });
    server
        .backend
        .write(&id, &serde_json::to_vec(&record).unwrap())
        .await
        .unwrap();

    let mut browser = browser;
    browser.set_cookie("SESSIONID", id.as_str());
    let (mut session, _) = server.request(&browser);
    assert_eq!(session.start_session().await.unwrap(), SessionStart::Invalidated);
}

#[tokio::test]
async fn test_inactive_record_without_forward_target_is_invalid() {
    let server = Server::new(SessionManagerConfig::default(), false);
    let mut browser = Browser::new(FIREFOX);
    let id = SessionId::generate();

    let record = serde_json::json!({
        METADATA_KEY: {
            "instantiated_at": server.now(),
            "regenerate_id_at": null,
            "session_start_count": 1,
            "is_active": false,
            "expire_data_at": server.now() + Duration::minutes(5),
            "forward_to_session_id": null,
            "fingerprint": browser.signals.fingerprint(),
        }
    });
    server
        .backend
        .write(&id, &serde_json::to_vec(&record).unwrap())
        .await
        .unwrap();

    browser.set_cookie("SESSIONID", id.as_str());
    let (mut session, _) = server.request(&browser);
    assert_eq!(session.start_session().await.unwrap(), SessionStart::Invalidated);
}

#[tokio::test]
async fn test_client_without_signals_is_stable() {
    let server = Server::new(SessionManagerConfig::default(), true);
    let mut browser = Browser::new(FIREFOX);
    browser.signals = ClientSignals::default();

    let (mut session, jar) = server.request(&browser);
    session.start_session().await.unwrap();
    session.commit_session().await.unwrap();
    browser.absorb(&jar);

    let (mut session, _) = server.request(&browser);
    assert_eq!(session.start_session().await.unwrap(), SessionStart::Continued);
}

proptest! {
    #[test]
    fn prop_parsed_ids_are_well_formed(value in ".{0,64}") {
        if let Ok(id) = SessionId::parse(&value) {
            prop_assert_eq!(id.as_str().len(), 48);
            prop_assert!(id.as_str().bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'v').contains(&b)));
        }
    }

    #[test]
    fn prop_generated_ids_parse(_seed in any::<u64>()) {
        let id = SessionId::generate();
        prop_assert_eq!(SessionId::parse(id.as_str()).unwrap(), id);
    }
}
