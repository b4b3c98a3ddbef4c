// Scripted in-memory backend for lifecycle, generation and HTTP tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::backend::{LoadedModel, ModelHandle, ModelLoader, Tokenizer};
use super::chat::{ChatConvention, SamplingPipeline};
use super::model_source::ModelSource;

pub const QWEN3_TEMPLATE: &str = r#"{%- for message in messages %}<|im_start|>{{ message.role }}
{{ message.content }}<|im_end|>
{% endfor %}
{%- if add_generation_prompt %}<|im_start|>assistant
{%- if enable_thinking is defined and not enable_thinking %}
<think>

</think>
{%- endif %}
{% endif %}"#;

/// Parks a generation until the test releases it.
#[derive(Debug)]
pub struct Gate {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Gate {
    /// Returns the gate plus the test's ends: a receiver signalled when a
    /// generation reaches the gate, and a sender that lets it through.
    pub fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let gate = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (gate, entered_rx, release_tx)
    }

    fn pass(&self) {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self
            .release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(10));
    }
}

/// What the tests can observe across every model the loader produced.
#[derive(Debug, Default)]
pub struct Probe {
    loads: AtomicUsize,
    dropped: AtomicUsize,
    reclaims: AtomicUsize,
    generations: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_max_tokens: Mutex<Option<usize>>,
}

impl Probe {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn reclaims(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn last_max_tokens(&self) -> Option<usize> {
        *self.last_max_tokens.lock().unwrap()
    }
}

/// Loads fake models. A repository id containing `broken` fails to load and
/// one containing `panic` panics inside the backend.
#[derive(Debug)]
pub struct MockLoader {
    pub probe: Arc<Probe>,
    output: String,
    template: Option<String>,
    gate: Option<Arc<Gate>>,
    echo_model_name: bool,
    fail_generation: bool,
    fail_reclaim: bool,
}

impl MockLoader {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            output: "Corrected text.".to_string(),
            template: Some(QWEN3_TEMPLATE.to_string()),
            gate: None,
            echo_model_name: false,
            fail_generation: false,
            fail_reclaim: false,
        }
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn without_template(mut self) -> Self {
        self.template = None;
        self
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Each model answers "Answer from <repository>." so tests can tell
    /// which one served a generation.
    pub fn echoing_model_name(mut self) -> Self {
        self.echo_model_name = true;
        self
    }

    pub fn failing_generation(mut self) -> Self {
        self.fail_generation = true;
        self
    }

    pub fn failing_reclaim(mut self) -> Self {
        self.fail_reclaim = true;
        self
    }
}

impl ModelLoader for MockLoader {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn load(&self, source: &ModelSource) -> Result<LoadedModel, String> {
        let name = match source {
            ModelSource::LocalFile(path) => path.to_string_lossy().into_owned(),
            ModelSource::Remote { repo, .. } => repo.clone(),
        };
        if name.contains("broken") {
            return Err("corrupt weights".to_string());
        }
        if name.contains("panic") {
            panic!("mock backend exploded");
        }

        self.probe.loads.fetch_add(1, Ordering::SeqCst);
        let output = if self.echo_model_name {
            format!("Answer from {name}.")
        } else {
            self.output.clone()
        };
        Ok(LoadedModel {
            handle: Box::new(MockHandle {
                probe: Arc::clone(&self.probe),
                output,
                gate: self.gate.clone(),
                fail: self.fail_generation,
            }),
            tokenizer: Box::new(WhitespaceTokenizer {
                convention: ChatConvention::new(self.template.clone(), Some(&name)),
            }),
        })
    }

    fn reclaim(&self) -> Result<(), String> {
        self.probe.reclaims.fetch_add(1, Ordering::SeqCst);
        if self.fail_reclaim {
            Err("device cache busy".to_string())
        } else {
            Ok(())
        }
    }
}

struct MockHandle {
    probe: Arc<Probe>,
    output: String,
    gate: Option<Arc<Gate>>,
    fail: bool,
}

impl ModelHandle for MockHandle {
    fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
        _pipeline: &SamplingPipeline,
        _stop_markers: &[String],
    ) -> Result<String, String> {
        *self.probe.last_prompt.lock().unwrap() = Some(prompt.to_string());
        *self.probe.last_max_tokens.lock().unwrap() = Some(max_tokens);
        self.probe.generations.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if self.fail {
            return Err("decode failed".to_string());
        }
        Ok(self.output.clone())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.probe.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// One token per whitespace-separated word.
struct WhitespaceTokenizer {
    convention: ChatConvention,
}

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<i32>, String> {
        Ok((0..text.split_whitespace().count() as i32).collect())
    }

    fn convention(&self) -> &ChatConvention {
        &self.convention
    }
}
