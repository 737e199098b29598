//! The capture orchestrator.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use frametap_capture::{
    FrameCallback, FrameExtractor, PresentHook, SharedChannel, SwapChainHandle,
};
use frametap_transport::{ChannelConfig, FrameChannel};
use frametap_types::FrameBuffer;

use crate::metrics::CaptureMetrics;
use crate::registry::{CallbackHandle, CallbackRegistry};
use crate::EngineResult;

/// State the present handler reaches from the host's render thread.
struct Shared {
    extractor: Mutex<FrameExtractor>,
    channel: Mutex<Option<SharedChannel>>,
    registry: CallbackRegistry,
    metrics: CaptureMetrics,
    /// One-time device binding happened; later presents skip it.
    bound: AtomicBool,
}

/// Owns one frame extractor and one ring channel, wired to one hook
/// source, for the life of the process.
///
/// Construct one explicitly and keep a single instance at the outermost
/// composition point (the module-level functions in this crate do exactly
/// that); nothing here is a hidden global.
pub struct CaptureOrchestrator {
    hook: Arc<dyn PresentHook>,
    config: ChannelConfig,
    shared: Arc<Shared>,
    initialized: AtomicBool,
}

impl CaptureOrchestrator {
    /// Create an orchestrator bound to a hook collaborator and channel
    /// configuration. No resources are acquired until
    /// [`initialize`](Self::initialize).
    pub fn new(hook: Arc<dyn PresentHook>, config: ChannelConfig) -> Self {
        Self {
            hook,
            config,
            shared: Arc::new(Shared {
                extractor: Mutex::new(FrameExtractor::new()),
                channel: Mutex::new(None),
                registry: CallbackRegistry::new(),
                metrics: CaptureMetrics::new(),
                bound: AtomicBool::new(false),
            }),
            initialized: AtomicBool::new(false),
        }
    }

    /// Open the channel, wire the extractor, and register the present
    /// handler with the hook collaborator. Idempotent; a second call is a
    /// no-op. Failing to find an immediate hook target is not an error —
    /// the handler stays registered for a future swap chain.
    pub fn initialize(&self) -> EngineResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            debug!("orchestrator already initialized");
            return Ok(());
        }

        let channel: SharedChannel = Arc::new(Mutex::new(FrameChannel::open(&self.config)?));
        {
            let mut extractor = self.shared.extractor.lock();
            let shared = Arc::clone(&self.shared);
            extractor.set_frame_callback(Box::new(move |frame: &FrameBuffer| {
                shared.registry.deliver(frame);
            }));
            extractor.attach_channel(Arc::clone(&channel));
        }
        *self.shared.channel.lock() = Some(channel);

        let shared = Arc::clone(&self.shared);
        self.hook
            .register_present_callback(Arc::new(move |swap_chain: &SwapChainHandle| {
                present_event(&shared, swap_chain);
            }));

        if !self.hook.try_install() {
            info!("no live swap chain yet; hook stays registered for the next one");
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!(channel = %self.config.name, "capture orchestrator initialized");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Add an in-process frame observer.
    pub fn register_frame_callback(&self, callback: FrameCallback) -> CallbackHandle {
        self.shared.registry.register(callback)
    }

    /// Tombstone a previously registered observer; other handles stay
    /// valid.
    pub fn unregister_frame_callback(&self, handle: CallbackHandle) {
        self.shared.registry.unregister(handle);
    }

    /// Receive frames over a bounded channel instead of a callback. A
    /// full channel drops the frame rather than stalling the render
    /// thread. Unregister the returned handle to stop.
    pub fn subscribe_frames(&self, capacity: usize) -> (CallbackHandle, Receiver<FrameBuffer>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let handle = self.shared.registry.register(Box::new(move |frame: &FrameBuffer| {
            if tx.try_send(frame.clone()).is_err() {
                trace!("subscriber channel full, dropping frame");
            }
        }));
        (handle, rx)
    }

    /// Capture counters.
    pub fn metrics(&self) -> &CaptureMetrics {
        &self.shared.metrics
    }

    /// Tear everything down: hook registration first, then the channel,
    /// then the extractor. Idempotent and safe to call repeatedly.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            debug!("orchestrator already shut down");
            return;
        }

        self.hook.clear_present_callbacks();
        *self.shared.channel.lock() = None;
        *self.shared.extractor.lock() = FrameExtractor::new();
        self.shared.bound.store(false, Ordering::SeqCst);
        self.shared.registry.clear();
        info!("capture orchestrator shut down");
    }
}

impl Drop for CaptureOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Entry point for every present event. Runs on whatever thread the
/// host's present call executes on, inside a foreign call stack — nothing
/// may unwind out of here.
fn present_event(shared: &Arc<Shared>, swap_chain: &SwapChainHandle) {
    let outcome = catch_unwind(AssertUnwindSafe(|| handle_present(shared, swap_chain)));
    if outcome.is_err() {
        shared.metrics.record_extraction_failure();
        error!("panic suppressed in present handler");
    }
}

fn handle_present(shared: &Shared, swap_chain: &SwapChainHandle) {
    let _op = shared.metrics.start_operation("extract_frame");

    #[cfg(windows)]
    if !shared.bound.load(Ordering::Acquire) {
        match bind_extractor(shared, swap_chain) {
            Ok(()) => shared.bound.store(true, Ordering::Release),
            Err(e) => {
                shared.metrics.record_extraction_failure();
                tracing::warn!(error = %e, "failed to bind extractor to swap-chain device");
                return;
            }
        }
    }

    match shared.extractor.lock().extract_frame(swap_chain) {
        Ok(()) => shared.metrics.record_frame_extracted(),
        Err(e) => {
            shared.metrics.record_extraction_failure();
            // The next present event is the retry.
            debug!(error = %e, "frame extraction failed");
        }
    }
}

/// One-time binding of the extractor to the device and context behind the
/// first observed swap chain. The acquired interfaces are scoped: they
/// release when these bindings drop, and the extractor keeps its own
/// references.
#[cfg(windows)]
fn bind_extractor(shared: &Shared, swap_chain: &SwapChainHandle) -> EngineResult<()> {
    use frametap_capture::CaptureError;
    use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11DeviceContext};

    let device: ID3D11Device = unsafe { swap_chain.GetDevice() }.map_err(CaptureError::from)?;
    let context: ID3D11DeviceContext = unsafe {
        let mut context = None;
        device.GetImmediateContext(&mut context);
        context.ok_or(CaptureError::WindowsApi {
            message: "device has no immediate context".to_string(),
            source: None,
        })?
    };

    shared.extractor.lock().initialize(&device, &context)?;
    info!("extractor bound to swap-chain device");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use frametap_capture::PresentCallback;
    use tempfile::TempDir;

    /// Hook collaborator double: records registrations and can replay
    /// present events.
    #[derive(Default)]
    struct TestHook {
        callbacks: Mutex<Vec<PresentCallback>>,
        installs: AtomicUsize,
    }

    impl PresentHook for TestHook {
        fn register_present_callback(&self, callback: PresentCallback) {
            self.callbacks.lock().push(callback);
        }

        fn clear_present_callbacks(&self) {
            self.callbacks.lock().clear();
        }

        fn try_install(&self) -> bool {
            self.installs.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    impl TestHook {
        fn registered(&self) -> usize {
            self.callbacks.lock().len()
        }

        #[cfg(not(windows))]
        fn fire_present(&self) {
            let callbacks: Vec<_> = self.callbacks.lock().clone();
            for callback in callbacks {
                callback(&SwapChainHandle);
            }
        }
    }

    fn test_setup(tag: &str) -> (TempDir, Arc<TestHook>, CaptureOrchestrator) {
        let dir = TempDir::new().unwrap();
        let config = ChannelConfig {
            name: format!("frametap_orch_{}_{}", std::process::id(), tag),
            directory: Some(dir.path().to_path_buf()),
            ..ChannelConfig::default()
        };
        let hook = Arc::new(TestHook::default());
        let orchestrator = CaptureOrchestrator::new(Arc::clone(&hook) as Arc<dyn PresentHook>, config);
        (dir, hook, orchestrator)
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (_dir, hook, orchestrator) = test_setup("idempotent_init");

        orchestrator.initialize().unwrap();
        orchestrator.initialize().unwrap();

        assert!(orchestrator.is_initialized());
        // The handler was registered and installation attempted once.
        assert_eq!(hook.registered(), 1);
        assert_eq!(hook.installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_clears_hook() {
        let (_dir, hook, orchestrator) = test_setup("idempotent_shutdown");

        orchestrator.initialize().unwrap();
        orchestrator.shutdown();
        orchestrator.shutdown();

        assert!(!orchestrator.is_initialized());
        assert_eq!(hook.registered(), 0);
    }

    #[test]
    fn test_callback_handles_survive_unregistration() {
        let (_dir, _hook, orchestrator) = test_setup("handles");

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let first = orchestrator.register_frame_callback(Box::new(move |_: &FrameBuffer| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));
        let kept_hits = Arc::new(AtomicUsize::new(0));
        let kept_clone = Arc::clone(&kept_hits);
        let second = orchestrator.register_frame_callback(Box::new(move |_: &FrameBuffer| {
            kept_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_ne!(first, second);

        orchestrator.unregister_frame_callback(first);
        orchestrator.unregister_frame_callback(first);

        let frame = FrameBuffer::new(
            2,
            2,
            8,
            frametap_types::PixelFormat::Bgra8,
            0,
            0,
            bytes::Bytes::from(vec![0u8; 16]),
        );
        orchestrator.shared.registry.deliver(&frame);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(kept_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_receives_delivered_frames() {
        let (_dir, _hook, orchestrator) = test_setup("subscribe");
        let (handle, rx) = orchestrator.subscribe_frames(4);

        let frame = FrameBuffer::new(
            2,
            2,
            8,
            frametap_types::PixelFormat::Rgba8,
            7,
            3,
            bytes::Bytes::from(vec![9u8; 16]),
        );
        orchestrator.shared.registry.deliver(&frame);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.sequence, 3);
        assert_eq!(received.data, frame.data);

        orchestrator.unregister_frame_callback(handle);
        orchestrator.shared.registry.deliver(&frame);
        assert!(rx.try_recv().is_err());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_present_event_failure_never_escapes() {
        let (_dir, hook, orchestrator) = test_setup("contained");
        orchestrator.initialize().unwrap();

        // The stub extractor fails every extraction; the handler logs and
        // counts instead of unwinding into the "host".
        hook.fire_present();
        hook.fire_present();

        let snapshot = orchestrator.metrics().snapshot();
        assert_eq!(snapshot.frames_extracted, 0);
        assert_eq!(snapshot.extraction_failures, 2);
    }

    #[test]
    fn test_reinitialize_after_shutdown() {
        let (_dir, hook, orchestrator) = test_setup("reinit");

        orchestrator.initialize().unwrap();
        orchestrator.shutdown();
        orchestrator.initialize().unwrap();

        assert!(orchestrator.is_initialized());
        assert_eq!(hook.registered(), 1);
    }
}
