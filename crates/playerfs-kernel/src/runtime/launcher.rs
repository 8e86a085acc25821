//! Boot and start sequencing.

use std::sync::OnceLock;
use tracing::{Instrument, info, info_span};

use super::{LaunchError, Runtime, RuntimeArgs};
use crate::composer::{Composer, Manifest, Namespace};
use crate::readiness::{ReadinessJoin, ReadySource};
use crate::vfs::MountEntry;

/// Drives a [`Runtime`] through boot and start.
///
/// `boot` prepares the namespace while the runtime initializes; `start`
/// is refused until both have reported ready.
pub struct Launcher<R> {
    runtime: R,
    readiness: ReadinessJoin,
    namespace: OnceLock<Namespace>,
}

impl<R: Runtime> Launcher<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            readiness: ReadinessJoin::new(),
            namespace: OnceLock::new(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn readiness(&self) -> &ReadinessJoin {
        &self.readiness
    }

    /// The namespace, once boot succeeded.
    pub fn namespace(&self) -> Option<&Namespace> {
        self.namespace.get()
    }

    /// Compose and stage the namespace while the runtime initializes.
    ///
    /// The namespace only signals ready after staging completed; any
    /// failure is returned and the join stays incomplete. A launcher boots
    /// once: after a successful boot, further calls are `AlreadyBooted`
    /// and stage nothing.
    pub async fn boot(
        &self,
        composer: &Composer,
        mounts: impl IntoIterator<Item = MountEntry>,
        manifest: &Manifest,
    ) -> Result<Namespace, LaunchError> {
        if self.namespace.get().is_some() {
            return Err(LaunchError::AlreadyBooted);
        }

        let prepare = async {
            let ns = composer.compose(mounts)?;
            composer.stage(&ns, manifest).await?;
            self.readiness.signal(ReadySource::Namespace);
            Ok::<_, LaunchError>(ns)
        };
        let init = async {
            self.runtime.initialized().await?;
            self.readiness.signal(ReadySource::Runtime);
            Ok::<_, LaunchError>(())
        };

        let (ns, ()) = async { tokio::try_join!(prepare, init) }
            .instrument(info_span!("launch.boot"))
            .await?;

        self.readiness.wait().await;
        self.namespace
            .set(ns.clone())
            .map_err(|_| LaunchError::AlreadyBooted)?;
        info!(mounts = ns.mounts().len(), "player ready");
        Ok(ns)
    }

    /// Call the entry point, then resume the main loop.
    pub async fn start(&self, args: &RuntimeArgs) -> Result<(), LaunchError> {
        let state = self.readiness.state();
        let ns = match self.namespace.get() {
            Some(ns) if state.is_ready() => ns,
            _ => return Err(LaunchError::NotReady(state)),
        };

        async {
            info!(args = ?args.as_slice(), "starting runtime");
            self.runtime.call_main(ns, args).await?;
            self.runtime.resume_main_loop().await?;
            Ok(())
        }
        .instrument(info_span!("launch.start"))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::ComposeError;
    use crate::readiness::Readiness;
    use crate::runtime::RuntimeError;
    use crate::vfs::{MemoryBackend, VfsOps};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRuntime {
        calls: Mutex<Vec<String>>,
        fail_init: bool,
    }

    impl RecordingRuntime {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Runtime for RecordingRuntime {
        async fn initialized(&self) -> Result<(), RuntimeError> {
            self.calls.lock().unwrap().push("initialized".into());
            if self.fail_init {
                return Err(RuntimeError::Init("broken".into()));
            }
            Ok(())
        }

        async fn call_main(&self, ns: &Namespace, args: &RuntimeArgs) -> Result<(), RuntimeError> {
            // The staged configuration must be visible by now.
            assert!(ns.exists("/userdata/retroarch.cfg").await);
            self.calls
                .lock()
                .unwrap()
                .push(format!("call_main {}", args.as_slice().join(" ")));
            Ok(())
        }

        async fn resume_main_loop(&self) -> Result<(), RuntimeError> {
            self.calls.lock().unwrap().push("resume_main_loop".into());
            Ok(())
        }
    }

    fn mounts() -> Vec<MountEntry> {
        vec![
            MountEntry::new("/userdata", MemoryBackend::new()),
            MountEntry::new(
                "/content",
                MemoryBackend::with_files([("retroarch.cfg", "X=1")]).unwrap(),
            ),
        ]
    }

    fn manifest() -> Manifest {
        [("/content/retroarch.cfg", "/userdata/retroarch.cfg")]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_boot_then_start() {
        let launcher = Launcher::new(RecordingRuntime::default());
        let composer = Composer::new("/userdata/content");

        let ns = launcher.boot(&composer, mounts(), &manifest()).await.unwrap();
        assert!(launcher.readiness().is_ready());
        assert_eq!(ns.read("/userdata/retroarch.cfg").await.unwrap(), b"X=1");

        let args = RuntimeArgs::new(["-v".to_string()]);
        launcher.start(&args).await.unwrap();
        assert_eq!(
            launcher.runtime().calls(),
            vec!["initialized", "call_main -v", "resume_main_loop"]
        );
    }

    #[tokio::test]
    async fn test_second_boot_is_refused() {
        let launcher = Launcher::new(RecordingRuntime::default());
        let composer = Composer::new("/userdata/content");
        let first = launcher.boot(&composer, mounts(), &manifest()).await.unwrap();

        let err = launcher.boot(&composer, mounts(), &manifest()).await.unwrap_err();
        assert!(matches!(err, LaunchError::AlreadyBooted));
        assert_eq!(launcher.runtime().calls(), vec!["initialized"]);

        // The first namespace is still the one in use.
        first
            .vfs()
            .write_all(std::path::Path::new("/userdata/marker"), b"1")
            .await
            .unwrap();
        let kept = launcher.namespace().unwrap();
        assert!(kept.exists("/userdata/marker").await);
    }

    #[tokio::test]
    async fn test_start_before_boot_is_refused() {
        let launcher = Launcher::new(RecordingRuntime::default());
        let err = launcher.start(&RuntimeArgs::default()).await.unwrap_err();
        assert!(matches!(err, LaunchError::NotReady(Readiness::NoneReady)));
        assert!(launcher.runtime().calls().is_empty());
    }

    #[tokio::test]
    async fn test_staging_failure_never_signals_namespace() {
        let launcher = Launcher::new(RecordingRuntime::default());
        let composer = Composer::new("/userdata/content");
        let manifest: Manifest = [("/content/missing", "/userdata/missing")]
            .into_iter()
            .collect();

        let err = launcher.boot(&composer, mounts(), &manifest).await.unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Compose(ComposeError::SourceNotFound { .. })
        ));
        assert!(!launcher.readiness().is_ready());
        assert!(matches!(
            launcher.start(&RuntimeArgs::default()).await,
            Err(LaunchError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_runtime_init_failure() {
        let launcher = Launcher::new(RecordingRuntime {
            fail_init: true,
            ..Default::default()
        });
        let composer = Composer::new("/userdata/content");
        let err = launcher.boot(&composer, mounts(), &manifest()).await.unwrap_err();
        assert!(matches!(err, LaunchError::Runtime(RuntimeError::Init(_))));
        assert!(!launcher.readiness().is_ready());
    }
}
