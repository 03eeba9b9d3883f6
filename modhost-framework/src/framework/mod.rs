//! The framework instance tying bundles, the registry and event
//! dispatch together (spec ยง4.8).

pub mod config;
pub mod core;
pub mod dispatcher;
pub mod errors;
pub mod lock;

pub use config::{FrameworkConfig, FrameworkConfigBuilder};
pub use core::{ArchiveFactory, Framework};
pub use errors::FrameworkError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::archive::test_support::StaticArchive;
    use crate::bundle::{BundleActivator, BundleContext, BundleError, BundleEventKind, BundleState};
    use crate::util::BundleId;
    use std::sync::Arc;

    fn archive_factory() -> ArchiveFactory {
        Box::new(|location: &str| {
            Ok(Arc::new(StaticArchive {
                location: location.to_string(),
                libraries: vec![],
            }) as Arc<dyn crate::bundle::BundleArchive>)
        })
    }

    struct NoopActivator;
    impl BundleActivator for NoopActivator {
        fn start(&mut self, _ctx: &BundleContext) -> Result<(), BundleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn install_start_stop_round_trip() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let id = framework.install_bundle("test://a").unwrap();
        framework.bundle(id).unwrap().set_activator(Box::new(NoopActivator));

        framework.start_bundle(id).unwrap();
        assert_eq!(framework.bundle(id).unwrap().state(), BundleState::Active);

        framework.stop_bundle(id).unwrap();
        assert_eq!(framework.bundle(id).unwrap().state(), BundleState::Resolved);
    }

    #[tokio::test]
    async fn installing_same_location_twice_returns_the_same_id() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let id1 = framework.install_bundle("test://a").unwrap();
        let id2 = framework.install_bundle("test://a").unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn unload_bundle_stops_and_removes_it() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let id = framework.install_bundle("test://a").unwrap();
        framework.bundle(id).unwrap().set_activator(Box::new(NoopActivator));
        framework.start_bundle(id).unwrap();

        framework.unload_bundle(id).unwrap();
        assert!(framework.bundle(id).is_none());
    }

    #[tokio::test]
    async fn unload_then_reinstall_reuses_the_bundle_id() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let id = framework.install_bundle("test://a").unwrap();
        framework.unload_bundle(id).unwrap();

        assert_eq!(framework.get_bundle_id_by_location("test://a"), Some(id));
        let reinstalled = framework.install_bundle("test://a").unwrap();
        assert_eq!(reinstalled, id);
    }

    #[tokio::test]
    async fn uninstall_then_reinstall_mints_a_new_id() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let id = framework.install_bundle("test://a").unwrap();
        framework.uninstall_bundle(id).unwrap();

        assert_eq!(framework.get_bundle_id_by_location("test://a"), None);
        let reinstalled = framework.install_bundle("test://a").unwrap();
        assert_ne!(reinstalled, id);
    }

    #[tokio::test]
    async fn get_bundle_state_and_list_bundles() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        assert_eq!(framework.get_bundle_state(BundleId(999)), None);

        let id = framework.install_bundle("test://a").unwrap();
        assert_eq!(framework.get_bundle_state(id), Some(BundleState::Installed));
        assert_eq!(framework.list_bundles().len(), 1);
        assert_eq!(framework.get_bundle_id_by_location("test://a"), Some(id));
        assert_eq!(framework.get_bundle_id_by_location("test://unknown"), None);
    }

    #[tokio::test]
    async fn bundle_listener_sees_events_in_order() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        framework.add_bundle_listener_raw(Arc::new(move |id, kind| seen_clone.lock().push((id, kind))));

        let id = framework.install_bundle("test://a").unwrap();
        framework.bundle(id).unwrap().set_activator(Box::new(NoopActivator));
        framework.start_bundle(id).unwrap();
        framework.stop_framework().await;

        let kinds: Vec<BundleEventKind> = seen.lock().iter().map(|(_, kind)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                BundleEventKind::Installed,
                BundleEventKind::Resolved,
                BundleEventKind::Starting,
                BundleEventKind::Started,
                BundleEventKind::Stopping,
                BundleEventKind::Stopped,
            ]
        );
        assert!(seen.lock().iter().all(|(bundle_id, _)| *bundle_id == id));
    }

    #[tokio::test]
    async fn stop_framework_stops_active_bundles_in_reverse_install_order() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let a = framework.install_bundle("test://a").unwrap();
        let b = framework.install_bundle("test://b").unwrap();
        framework.bundle(a).unwrap().set_activator(Box::new(NoopActivator));
        framework.bundle(b).unwrap().set_activator(Box::new(NoopActivator));
        framework.start_bundle(a).unwrap();
        framework.start_bundle(b).unwrap();

        framework.stop_framework().await;

        assert_eq!(framework.bundle(a).unwrap().state(), BundleState::Resolved);
        assert_eq!(framework.bundle(b).unwrap().state(), BundleState::Resolved);
    }

    #[tokio::test]
    async fn wait_for_stop_resolves_after_stop_framework() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        let framework_clone = framework.clone();
        let handle = tokio::spawn(async move { framework_clone.wait_for_stop().await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        framework.stop_framework().await;
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("wait_for_stop should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn operations_after_shutdown_fail_with_framework_shutdown() {
        let framework = Framework::new(FrameworkConfig::default(), archive_factory());
        framework.stop_framework().await;

        let err = framework.install_bundle("test://late").unwrap_err();
        assert!(matches!(err, FrameworkError::FrameworkShutdown));
    }
}
