//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use talkback::chat::{Chat, ChatBackend, ChatList, ChatStore, SharedChats};
use talkback::config::VoiceConfig;
use talkback::voice::{
    DispatchBridge, PlaybackRequest, PlaybackSink, RecognitionEngine, RecognitionSink,
    SynthesisEngine, VoiceInfo,
};
use talkback::{Error, Result, VoiceController, VoiceHandle};

/// What the fake devices have been doing
#[derive(Debug, Default)]
pub struct DeviceState {
    pub recognizing: bool,
    pub speaking: bool,
    /// Set if recognition and synthesis were ever active at once
    pub overlapped: bool,
    /// Set if a run was started while the previous one was still live
    pub runs_overlapped: bool,
    pub recognition_starts: usize,
    pub recognition_stops: usize,
    pub spoken: Vec<String>,
    pub cancels: usize,
}

/// Device log shared by the fake recognizer and synthesizer
#[derive(Clone, Default)]
pub struct DeviceLog(Arc<Mutex<DeviceState>>);

impl DeviceLog {
    fn update(&self, f: impl FnOnce(&mut DeviceState)) {
        let mut state = self.0.lock().unwrap();
        f(&mut state);
        if state.recognizing && state.speaking {
            state.overlapped = true;
        }
    }

    pub fn overlapped(&self) -> bool {
        self.0.lock().unwrap().overlapped
    }

    pub fn recognizing(&self) -> bool {
        self.0.lock().unwrap().recognizing
    }

    pub fn speaking(&self) -> bool {
        self.0.lock().unwrap().speaking
    }

    pub fn runs_overlapped(&self) -> bool {
        self.0.lock().unwrap().runs_overlapped
    }

    pub fn recognition_starts(&self) -> usize {
        self.0.lock().unwrap().recognition_starts
    }

    pub fn recognition_stops(&self) -> usize {
        self.0.lock().unwrap().recognition_stops
    }

    pub fn spoken(&self) -> Vec<String> {
        self.0.lock().unwrap().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.0.lock().unwrap().cancels
    }
}

/// Recognizer driven by the test through a [`RecognizerRemote`]
pub struct FakeRecognizer {
    supported: bool,
    stop_delay: Duration,
    sink: Arc<Mutex<Option<RecognitionSink>>>,
    log: DeviceLog,
}

/// Test-side control of a [`FakeRecognizer`]
#[derive(Clone)]
pub struct RecognizerRemote {
    sink: Arc<Mutex<Option<RecognitionSink>>>,
    log: DeviceLog,
}

impl FakeRecognizer {
    pub fn new(supported: bool, log: DeviceLog) -> (Self, RecognizerRemote) {
        let sink = Arc::new(Mutex::new(None));
        let remote = RecognizerRemote {
            sink: Arc::clone(&sink),
            log: log.clone(),
        };
        (
            Self {
                supported,
                stop_delay: Duration::ZERO,
                sink,
                log,
            },
            remote,
        )
    }

    /// Confirm stops only after `delay`, the way a device thread winds down
    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }
}

impl RecognitionEngine for FakeRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, sink: RecognitionSink) -> Result<()> {
        if !self.supported {
            return Err(Error::Unsupported("fake recognizer".to_string()));
        }
        self.log.update(|s| {
            if s.recognizing {
                s.runs_overlapped = true;
            }
            s.recognizing = true;
            s.recognition_starts += 1;
        });
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.log.update(|s| s.recognition_stops += 1);
        let Some(sink) = self.sink.lock().unwrap().take() else {
            return;
        };

        if self.stop_delay.is_zero() {
            self.log.update(|s| s.recognizing = false);
            sink.ended();
            return;
        }

        let log = self.log.clone();
        let delay = self.stop_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            log.update(|s| s.recognizing = false);
            sink.ended();
        });
    }
}

impl RecognizerRemote {
    /// Deliver a cumulative transcript; false if no run is active
    pub fn say(&self, text: &str) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => {
                sink.fragment(text);
                true
            }
            None => false,
        }
    }

    /// The engine ends the run on its own
    pub fn end(&self) {
        self.log.update(|s| s.recognizing = false);
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.ended();
        }
    }

    /// The engine reports an error and gives up on the run
    pub fn fail(&self, error: &str) {
        self.log.update(|s| s.recognizing = false);
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.failed(error);
        }
    }

    pub fn is_running(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

/// Synthesizer that speaks until the test calls [`SynthRemote::finish`]
pub struct FakeSynthesizer {
    sink: Arc<Mutex<Option<PlaybackSink>>>,
    log: DeviceLog,
}

/// Test-side control of a [`FakeSynthesizer`]
#[derive(Clone)]
pub struct SynthRemote {
    sink: Arc<Mutex<Option<PlaybackSink>>>,
    log: DeviceLog,
}

impl FakeSynthesizer {
    pub fn new(log: DeviceLog) -> (Self, SynthRemote) {
        let sink = Arc::new(Mutex::new(None));
        let remote = SynthRemote {
            sink: Arc::clone(&sink),
            log: log.clone(),
        };
        (Self { sink, log }, remote)
    }
}

impl SynthesisEngine for FakeSynthesizer {
    fn speak(&mut self, request: PlaybackRequest, sink: PlaybackSink) -> Result<()> {
        self.log.update(|s| {
            s.speaking = true;
            s.spoken.push(request.text.clone());
        });
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn cancel(&mut self) {
        self.log.update(|s| {
            s.speaking = false;
            s.cancels += 1;
        });
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.ended();
        }
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo {
                name: "Alice".to_string(),
                language: Some("en-US".to_string()),
                default: true,
            },
            VoiceInfo {
                name: "Bob".to_string(),
                language: Some("en-GB".to_string()),
                default: false,
            },
        ]
    }
}

impl SynthRemote {
    /// Playback reaches the end of the text
    pub fn finish(&self) {
        self.log.update(|s| s.speaking = false);
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.ended();
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

/// Backend answering from a script, then with a fixed default reply
#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn replying(reply: &str) -> Arc<Self> {
        Self::scripted([Ok(reply.to_string())], Duration::ZERO)
    }

    pub fn failing(error: &str) -> Arc<Self> {
        Self::scripted([Err(error.to_string())], Duration::ZERO)
    }

    pub fn scripted(
        replies: impl IntoIterator<Item = std::result::Result<String, String>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn send_chat(&self, text: &str) -> Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(Error::Dispatch(error)),
            None => Ok("ok".to_string()),
        }
    }
}

/// In-memory chat store
#[derive(Default)]
pub struct MemoryStore {
    chats: Mutex<Vec<Chat>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with_chats(chats: Vec<Chat>) -> Arc<Self> {
        Arc::new(Self {
            chats: Mutex::new(chats),
            saves: AtomicUsize::new(0),
        })
    }

    pub fn saved(&self) -> Vec<Chat> {
        self.chats.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn load_chats(&self) -> Result<Vec<Chat>> {
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn save_chats(&self, chats: &[Chat]) -> Result<()> {
        *self.chats.lock().unwrap() = chats.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A running voice controller wired to fakes
pub struct VoiceHarness {
    pub handle: VoiceHandle,
    pub recognizer: RecognizerRemote,
    pub synth: SynthRemote,
    pub log: DeviceLog,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryStore>,
    pub chats: SharedChats,
    pub task: JoinHandle<()>,
}

/// Spawn a controller with a supported recognizer
pub fn spawn_voice(config: VoiceConfig, backend: Arc<FakeBackend>) -> VoiceHarness {
    spawn_voice_with(config, backend, true)
}

/// Spawn a controller with the given recognizer support
pub fn spawn_voice_with(
    config: VoiceConfig,
    backend: Arc<FakeBackend>,
    supported: bool,
) -> VoiceHarness {
    build_voice(config, backend, supported, Duration::ZERO)
}

/// Spawn a controller whose recognizer confirms each stop after `delay`
pub fn spawn_voice_slow_stop(
    config: VoiceConfig,
    backend: Arc<FakeBackend>,
    delay: Duration,
) -> VoiceHarness {
    build_voice(config, backend, true, delay)
}

fn build_voice(
    config: VoiceConfig,
    backend: Arc<FakeBackend>,
    supported: bool,
    stop_delay: Duration,
) -> VoiceHarness {
    let log = DeviceLog::default();
    let (recognizer, recognizer_remote) = FakeRecognizer::new(supported, log.clone());
    let recognizer = recognizer.with_stop_delay(stop_delay);
    let (synth, synth_remote) = FakeSynthesizer::new(log.clone());

    let chats = ChatList::new().into_shared();
    let store = MemoryStore::with_chats(Vec::new());
    let bridge = DispatchBridge::new(
        Arc::clone(&chats),
        Arc::clone(&backend) as Arc<dyn ChatBackend>,
        Some(Arc::clone(&store) as Arc<dyn ChatStore>),
    );

    let (controller, handle) =
        VoiceController::new(config, Box::new(recognizer), Box::new(synth), bridge);
    let task = tokio::spawn(controller.run());

    VoiceHarness {
        handle,
        recognizer: recognizer_remote,
        synth: synth_remote,
        log,
        backend,
        store,
        chats,
        task,
    }
}

/// Let every ready task run without moving the paused clock far
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
