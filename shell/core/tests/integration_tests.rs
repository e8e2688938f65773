//! Integration tests for the shell
//!
//! These tests drive a complete shell (owner transport, sender guard, view
//! registry, headless backend) through controller-side proxies, the way the
//! main UI would. Tests cover:
//! - Overlay stacking over a plain view
//! - Reverse requests: timeout, late responses, cross-talk, peer destruction
//! - Sender trust following the life of first-party windows
//! - Activation pointers, hide-all / show-active, idempotent destroy
//! - Configuration files affecting the registry
//! - Native event relay

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio::time::Instant;

use shell_core::config::{load_config_from_path, ConfigOverrides};
use shell_core::transport::{PeerResponse, PendingRequests, Resolution};
use shell_core::view::{
    HeadlessFactory, HeadlessHost, SurfaceFactory, SurfaceHost, ViewEventKind,
};
use shell_core::{
    Bounds, Channel, Controller, CreateOptions, FirstPartySurface, Shell, ShellBuilder,
    ShellConfig, TransportError, ViewEvent, ViewId, ViewLifecycle,
};

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    shell: Shell,
    host: Arc<HeadlessHost>,
    factory: Arc<HeadlessFactory>,
    main: Controller,
}

fn harness_with(config: ShellConfig) -> Harness {
    let host = HeadlessHost::new();
    let factory = HeadlessFactory::new(&host);
    let shell = ShellBuilder::new(config)
        .with_host(Arc::clone(&host) as Arc<dyn SurfaceHost>)
        .with_factory(Arc::clone(&factory) as Arc<dyn SurfaceFactory>)
        .build()
        .expect("shell builds");
    shell.start();
    let main = shell.spawn_controller(Some(FirstPartySurface::Main));
    Harness {
        shell,
        host,
        factory,
        main,
    }
}

fn harness() -> Harness {
    harness_with(ShellConfig::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ResourceRequest {
    id: String,
    delay_secs: u64,
}

const GET_RESOURCE: Channel<ResourceRequest, String> = Channel::new("getResource");

fn serve_resources(controller: &Controller) {
    controller
        .transport()
        .handle_peer_request(&GET_RESOURCE, |_, request: ResourceRequest| async move {
            tokio::time::sleep(Duration::from_secs(request.delay_secs)).await;
            Ok(format!("resource {}", request.id))
        })
        .expect("controller side accepts reverse handlers");
}

fn resource(id: &str, delay_secs: u64) -> ResourceRequest {
    ResourceRequest {
        id: id.to_string(),
        delay_secs,
    }
}

// =============================================================================
// Test 1: Overlay Over a Plain View
// =============================================================================

/// An activated overlay hides the plain view; destroying the overlay clears
/// the overlay pointer and leaves the plain view hidden.
#[tokio::test]
async fn test_overlay_over_plain_view_end_to_end() {
    let h = harness();
    let client = h.main.client();

    let v1 = client
        .create(CreateOptions::new().with_id("v1").activated())
        .await
        .expect("v1 created");
    let v2 = client
        .create(CreateOptions::new().with_id("v2").overlay().activated())
        .await
        .expect("v2 created");

    let registry = h.shell.registry();
    assert_eq!(registry.lifecycle(v1.id()), ViewLifecycle::Detached);
    assert_eq!(registry.lifecycle(v2.id()), ViewLifecycle::Attached);
    assert_eq!(registry.active_overlay_view_id(), Some(ViewId::new("v2")));
    assert_eq!(registry.active_view_id(), Some(ViewId::new("v1")));

    assert!(v2.destroy().await);
    assert_eq!(registry.active_overlay_view_id(), None);
    assert_eq!(registry.lifecycle(v1.id()), ViewLifecycle::Detached);
    assert_eq!(registry.lifecycle(v2.id()), ViewLifecycle::Destroyed);

    // Only an explicit show brings the plain view back.
    assert!(client.show_active(None).await);
    assert!(registry.is_attached(v1.id()));
}

// =============================================================================
// Test 2: Late Response After Timeout
// =============================================================================

/// A 40 s handler against a 30 s timeout: the caller times out at 30 s and
/// the response arriving at 40 s is dropped.
#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout_is_dropped() {
    let h = harness();
    serve_resources(&h.main);
    let owner = h.shell.transport();

    let started = Instant::now();
    let err = owner
        .request_from_peer(&GET_RESOURCE, &h.main.handle(), &resource("r1", 40))
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {err}");
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(31));
    assert_eq!(owner.pending_requests(), 0);

    // Let the handler finish and its response arrive.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(owner.pending_requests(), 0);

    // The link is still healthy.
    let reply = owner
        .request_from_peer(&GET_RESOURCE, &h.main.handle(), &resource("r2", 1))
        .await
        .unwrap();
    assert_eq!(reply, "resource r2");
}

// =============================================================================
// Test 3: No Cross-Talk
// =============================================================================

/// Concurrent reverse requests on one channel each get their own response,
/// even when responses arrive in the opposite order.
#[tokio::test(start_paused = true)]
async fn test_concurrent_reverse_requests_do_not_cross_talk() {
    let h = harness();
    serve_resources(&h.main);
    let owner = h.shell.transport();
    let peer = h.main.handle();

    let slow_req = resource("slow", 5);
    let fast_req = resource("fast", 1);
    let (slow, fast) = tokio::join!(
        owner.request_from_peer(&GET_RESOURCE, &peer, &slow_req),
        owner.request_from_peer(&GET_RESOURCE, &peer, &fast_req),
    );

    assert_eq!(slow.unwrap(), "resource slow");
    assert_eq!(fast.unwrap(), "resource fast");
    assert_eq!(owner.pending_requests(), 0);
}

// =============================================================================
// Test 4: Peer Destruction Beats Timeout
// =============================================================================

/// A peer destroyed while a request is pending rejects it with a
/// destroyed-specific error, just before the timeout would have fired.
#[tokio::test(start_paused = true)]
async fn test_destroyed_peer_rejects_before_timeout() {
    let h = harness();
    serve_resources(&h.main);
    let owner = Arc::clone(h.shell.transport());
    let peer = h.main.handle();

    let started = Instant::now();
    let request = tokio::spawn(async move {
        owner
            .request_from_peer(&GET_RESOURCE, &peer, &resource("r", 40))
            .await
    });

    tokio::time::sleep(Duration::from_millis(29_990)).await;
    h.main.destroy();

    let err = request.await.unwrap().unwrap_err();
    assert!(
        matches!(err, TransportError::PeerDestroyed { .. }),
        "expected destroyed, got {err}"
    );
    assert!(!err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(h.shell.transport().pending_requests(), 0);

    // A request to a peer that is already gone fails without waiting.
    let err = h
        .shell
        .transport()
        .request_from_peer(&GET_RESOURCE, &h.main.handle(), &resource("r", 0))
        .await
        .unwrap_err();
    assert!(err.is_peer_gone());
}

// =============================================================================
// Test 5: Correlation Resolution Is Idempotent
// =============================================================================

#[test]
fn test_second_delivery_is_a_no_op() {
    let pending = PendingRequests::new();
    let peer = shell_core::PeerId::new(7);
    let id = pending.next_id();
    let mut rx = pending.register(id, "getResource", peer);

    let first = pending.resolve(peer, PeerResponse::ok(id, serde_json::json!("a")));
    let second = pending.resolve(peer, PeerResponse::ok(id, serde_json::json!("b")));

    assert_eq!(first, Resolution::Delivered);
    assert_eq!(second, Resolution::Unknown);
    assert_eq!(rx.try_recv().unwrap(), Ok(serde_json::json!("a")));
    assert!(pending.is_empty());
}

#[test]
fn test_response_from_another_peer_is_ignored() {
    let pending = PendingRequests::new();
    let id = pending.next_id();
    let _rx = pending.register(id, "getResource", shell_core::PeerId::new(7));

    let resolution = pending.resolve(shell_core::PeerId::new(8), PeerResponse::ok(id, serde_json::json!(1)));
    assert_eq!(resolution, Resolution::ForeignPeer);
    assert!(pending.contains(id));
    assert_ne!(pending.next_id(), id);
}

// =============================================================================
// Test 6: Sender Trust Follows Window Life
// =============================================================================

#[tokio::test]
async fn test_destroyed_window_loses_trust() {
    let h = harness();
    let settings = h.shell.spawn_controller(Some(FirstPartySurface::Settings));
    let stranger = h.shell.spawn_controller(None);

    assert!(h.shell.guard().is_trusted(h.main.id()));
    assert!(h.shell.guard().is_trusted(settings.id()));
    assert!(!h.shell.guard().is_trusted(stranger.id()));

    assert!(settings.client().create(CreateOptions::new()).await.is_some());
    settings.destroy();

    assert!(!h.shell.guard().is_trusted(settings.id()));
    assert!(settings.client().create(CreateOptions::new()).await.is_none());
    assert!(stranger.client().create(CreateOptions::new()).await.is_none());
    assert_eq!(h.shell.registry().len(), 1);
}

// =============================================================================
// Test 7: Activation Pointers
// =============================================================================

#[tokio::test]
async fn test_activate_touches_only_the_matching_pointer() {
    let h = harness();
    let client = h.main.client();
    let a = client.create(CreateOptions::new().with_id("a")).await.unwrap();
    let b = client.create(CreateOptions::new().with_id("b")).await.unwrap();
    let overlay = client
        .create(CreateOptions::new().with_id("o").overlay())
        .await
        .unwrap();
    let registry = h.shell.registry();

    assert!(a.activate().await);
    assert_eq!(registry.active_view_id(), Some(ViewId::new("a")));
    assert_eq!(registry.active_overlay_view_id(), None);

    assert!(overlay.activate().await);
    assert_eq!(registry.active_overlay_view_id(), Some(ViewId::new("o")));
    assert_eq!(registry.active_view_id(), Some(ViewId::new("a")));

    assert!(b.activate().await);
    assert_eq!(registry.active_view_id(), Some(ViewId::new("b")));
    assert_eq!(registry.active_overlay_view_id(), Some(ViewId::new("o")));

    let top = registry.snapshot(b.id()).unwrap().web_contents_id;
    assert_eq!(h.host.top(), Some(top));
}

// =============================================================================
// Test 8: Hide All / Show Active
// =============================================================================

#[tokio::test]
async fn test_hide_all_then_show_active_restores_active_view() {
    let h = harness();
    let client = h.main.client();
    client.create(CreateOptions::new().with_id("a").activated()).await.unwrap();
    client.create(CreateOptions::new().with_id("b").activated()).await.unwrap();
    let registry = h.shell.registry();

    assert!(client.hide_all().await);
    assert!(h.host.children().is_empty());

    assert!(client.show_active(None).await);
    assert!(registry.is_attached(&ViewId::new("b")));
    assert!(!registry.is_attached(&ViewId::new("a")));
}

#[tokio::test]
async fn test_show_active_gives_overlay_priority() {
    let h = harness();
    let client = h.main.client();
    client.create(CreateOptions::new().with_id("page").activated()).await.unwrap();
    client
        .create(CreateOptions::new().with_id("bar").overlay().activated())
        .await
        .unwrap();
    let registry = h.shell.registry();

    assert!(client.hide_all().await);
    assert!(client.show_active(Some(ViewId::new("page"))).await);

    let overlay = registry.snapshot(&ViewId::new("bar")).unwrap();
    assert!(overlay.is_attached());
    assert!(registry.is_attached(&ViewId::new("page")));
    assert_eq!(h.host.top(), Some(overlay.web_contents_id));
}

// =============================================================================
// Test 9: Idempotent Destroy
// =============================================================================

#[tokio::test]
async fn test_destroy_twice_matches_destroy_once() {
    let h = harness();
    let client = h.main.client();
    let keep = client.create(CreateOptions::new().with_id("keep").activated()).await.unwrap();
    let gone = client.create(CreateOptions::new().with_id("gone").activated()).await.unwrap();

    assert!(gone.destroy().await);
    let after_once = (h.shell.registry().views(), h.host.children());

    assert!(!gone.destroy().await);
    let after_twice = (h.shell.registry().views(), h.host.children());

    assert_eq!(after_once, after_twice);
    assert!(h.shell.registry().contains(keep.id()));
    assert_eq!(h.shell.registry().active_view_id(), None);
}

// =============================================================================
// Test 10: Configuration Drives the Registry
// =============================================================================

#[tokio::test]
async fn test_config_file_shapes_overlays() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[views]
overlay_border_radius = 24
overlay_partition = "persist:overlay-test"
"#,
    )
    .unwrap();

    let mut config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
    ConfigOverrides::new()
        .with_request_timeout_ms(5_000)
        .apply(&mut config);
    let h = harness_with(config);

    h.main
        .client()
        .create(CreateOptions::new().overlay().activated())
        .await
        .unwrap();
    let surface = h.factory.last().unwrap();

    assert_eq!(surface.border_radius(), 24);
    assert_eq!(h.shell.config().transport.request_timeout_ms, 5_000);
    if std::env::var("SHELL_OVERLAY_PARTITION").is_err() {
        assert_eq!(surface.spec().partition, "persist:overlay-test");
    }
}

// =============================================================================
// Test 11: Event Relay
// =============================================================================

#[tokio::test]
async fn test_load_events_are_relayed_in_order() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.main.client().on_view_event(move |envelope| {
        let _ = tx.send(envelope);
    });

    let view = h
        .main
        .client()
        .create(CreateOptions::new().with_id("tab").with_url("https://relay.test"))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Some(envelope) = rx.recv().await {
        assert_eq!(&envelope.view_id, view.id());
        let kind = envelope.event.kind();
        kinds.push(kind);
        if kind == ViewEventKind::DidStopLoading {
            break;
        }
    }
    assert_eq!(
        kinds,
        vec![
            ViewEventKind::WillNavigate,
            ViewEventKind::DidStartLoading,
            ViewEventKind::DidNavigate,
            ViewEventKind::DomReady,
            ViewEventKind::DidFinishLoad,
            ViewEventKind::DidStopLoading,
        ]
    );
}

#[tokio::test]
async fn test_failed_load_is_relayed_and_reported() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.main.client().on_view_event(move |envelope| {
        if let ViewEvent::DidFailLoad { validated_url, .. } = envelope.event {
            let _ = tx.send(validated_url);
        }
    });

    let view = h.main.client().create(CreateOptions::new()).await.unwrap();
    assert!(!view.load_url("not a url").await);
    assert_eq!(rx.recv().await.unwrap(), "not a url");
}

#[tokio::test]
async fn test_overlay_blur_hides_it() {
    let h = harness();
    let client = h.main.client();
    client.create(CreateOptions::new().with_id("page").activated()).await.unwrap();
    let overlay = client
        .create(CreateOptions::new().with_id("bar").overlay().activated())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_events_of(overlay.id().clone(), move |envelope| {
        if envelope.event == ViewEvent::Blur {
            let _ = tx.send(());
        }
    });
    h.factory.last().unwrap().blur();
    rx.recv().await.unwrap();

    // The relay hides the overlay right after notifying.
    for _ in 0..50 {
        if !h.shell.registry().is_attached(overlay.id()) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(!h.shell.registry().is_attached(overlay.id()));
    assert!(h.shell.registry().contains(overlay.id()));
}

// =============================================================================
// Test 12: Actions Through Proxies
// =============================================================================

#[tokio::test]
async fn test_capture_and_history_through_proxy() {
    let h = harness();
    let view = h
        .main
        .client()
        .create(
            CreateOptions::new()
                .with_url("https://one.test")
                .with_bounds(Bounds::new(0, 0, 1200, 900)),
        )
        .await
        .unwrap();

    assert!(view.load_url("https://two.test").await);
    let history = view.navigation_history().await.unwrap();
    assert_eq!(history.entries.len(), 2);
    assert_eq!(history.index, 1);

    assert!(view.go_back().await);
    assert_eq!(view.url().await.as_deref(), Some("https://one.test"));
    assert!(!view.go_back().await);

    let image = view.capture_page(None, None).await;
    assert_eq!(image.as_deref(), Some("data:image/png;headless,400x300"));
    assert_eq!(h.shell.registry().lifecycle(view.id()), ViewLifecycle::Created);
}

#[tokio::test]
async fn test_host_navigation_purges_views() {
    let h = harness();
    let view = h
        .main
        .client()
        .create(CreateOptions::new().activated())
        .await
        .unwrap();

    h.shell.handle_host_event(&shell_core::HostEvent::DidNavigate {
        url: "app://reloaded".into(),
    });

    assert!(h.shell.registry().is_empty());
    assert!(h.host.children().is_empty());
    assert!(!view.activate().await);
}
