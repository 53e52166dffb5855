// Local backend (candle)
//
// Loads a llama-architecture model once at startup and samples from it on a
// blocking thread per request. The model directory comes from
// CHATMIMIC_MODEL_PATH; a PEFT LoRA adapter there is merged into its base
// model's weights at load time. Without a usable directory the unmodified
// base model is fetched from the HuggingFace hub.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{
    Cache, Config as LlamaModelConfig, Llama, LlamaConfig, LlamaEosToks,
};
use hf_hub::api::sync::Api;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::GenerationRequest;
use super::ChatBackend;
use crate::config::constants::{
    ADAPTER_DIR, ENV_MODEL_PATH, REPEAT_LAST_N, REPEAT_PENALTY, STREAM_CHANNEL_CAPACITY,
};
use crate::config::{LocalConfig, TemplateKind};

const ADAPTER_CONFIG: &str = "adapter_config.json";
const ADAPTER_WEIGHTS: &str = "adapter_model.safetensors";
const PEFT_PREFIX: &str = "base_model.model.";

/// Where the served weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Full model directory (config.json, tokenizer.json, *.safetensors)
    Directory(PathBuf),
    /// LoRA adapter to merge into `base_model`
    Adapter {
        adapter_dir: PathBuf,
        base_model: String,
    },
    /// Unmodified base model from the hub
    Hub(String),
}

/// Pick the model source for `config`, falling back to the base model.
pub fn resolve_source(config: &LocalConfig) -> ModelSource {
    let fallback = || ModelSource::Hub(config.base_model.clone());

    let Some(path) = &config.model_path else {
        warn!(
            "{} not set, serving the unmodified base model {}",
            ENV_MODEL_PATH, config.base_model
        );
        return fallback();
    };

    if !path.exists() {
        warn!(
            path = %path.display(),
            "Model path not found, serving the unmodified base model {}",
            config.base_model
        );
        return fallback();
    }

    if let Some(adapter_dir) = find_adapter(path) {
        let base_model = AdapterConfig::read(&adapter_dir)
            .ok()
            .and_then(|c| c.base_model_name_or_path)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| config.base_model.clone());
        return ModelSource::Adapter {
            adapter_dir,
            base_model,
        };
    }

    if path.join("config.json").exists() {
        return ModelSource::Directory(path.clone());
    }

    warn!(
        path = %path.display(),
        "No model or adapter files in model path, serving the unmodified base model {}",
        config.base_model
    );
    fallback()
}

/// The adapter directory itself, or the `adapter/` directory a training run writes.
fn find_adapter(path: &Path) -> Option<PathBuf> {
    [path.to_path_buf(), path.join(ADAPTER_DIR)]
        .into_iter()
        .find(|dir| dir.join(ADAPTER_CONFIG).exists())
}

/// The fields of a PEFT `adapter_config.json` needed for merging.
#[derive(Debug, Deserialize)]
struct AdapterConfig {
    r: f64,
    lora_alpha: f64,
    #[serde(default)]
    base_model_name_or_path: Option<String>,
}

impl AdapterConfig {
    fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(ADAPTER_CONFIG);
        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Invalid {}", path.display()))
    }

    fn scale(&self) -> f64 {
        self.lora_alpha / self.r
    }
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: Vec<PathBuf>,
}

fn directory_files(dir: &Path) -> Result<ModelFiles> {
    let mut weights: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read model directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("safetensors"))
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(ADAPTER_WEIGHTS))
        .collect();
    weights.sort();
    if weights.is_empty() {
        bail!("No .safetensors weights in {}", dir.display());
    }

    let tokenizer = dir.join("tokenizer.json");
    if !tokenizer.exists() {
        bail!("tokenizer.json missing from {}", dir.display());
    }

    Ok(ModelFiles {
        config: dir.join("config.json"),
        tokenizer,
        weights,
    })
}

#[derive(Deserialize)]
struct SafetensorsIndex {
    weight_map: HashMap<String, String>,
}

/// Download (or reuse from the cache) a model's files from the hub.
fn hub_files(model_id: &str) -> Result<ModelFiles> {
    info!("Fetching {} from the HuggingFace hub", model_id);
    let api = Api::new().context("Failed to initialise HuggingFace hub client")?;
    let repo = api.model(model_id.to_string());

    let config = repo
        .get("config.json")
        .with_context(|| format!("Failed to fetch config.json for {}", model_id))?;
    let tokenizer = repo
        .get("tokenizer.json")
        .with_context(|| format!("Failed to fetch tokenizer.json for {}", model_id))?;

    let weights = match repo.get("model.safetensors") {
        Ok(path) => vec![path],
        Err(single_err) => {
            debug!("No single-file weights ({}), trying sharded index", single_err);
            let index_path = repo
                .get("model.safetensors.index.json")
                .with_context(|| format!("Failed to fetch weights for {}", model_id))?;
            let index: SafetensorsIndex = serde_json::from_slice(&fs::read(&index_path)?)
                .context("Invalid safetensors index")?;
            let shards: HashSet<String> = index.weight_map.into_values().collect();
            let mut shards: Vec<String> = shards.into_iter().collect();
            shards.sort();
            shards
                .iter()
                .map(|shard| {
                    repo.get(shard)
                        .with_context(|| format!("Failed to fetch {}", shard))
                })
                .collect::<Result<Vec<_>>>()?
        }
    };

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

fn load_tensors(paths: &[PathBuf], device: &Device) -> Result<HashMap<String, Tensor>> {
    let mut tensors = HashMap::new();
    for path in paths {
        let part = candle_core::safetensors::load(path, device)
            .with_context(|| format!("Failed to load weights from {}", path.display()))?;
        tensors.extend(part);
    }
    Ok(tensors)
}

/// Name of the base weight a PEFT `lora_A` key adapts, plus the matching `lora_B` key.
fn lora_target(a_key: &str) -> Option<(String, String)> {
    let module = a_key.strip_suffix(".lora_A.weight")?;
    let b_key = format!("{}.lora_B.weight", module);
    let target = module.strip_prefix(PEFT_PREFIX).unwrap_or(module);
    Some((format!("{}.weight", target), b_key))
}

/// Fold LoRA updates into `base`: `W += scale * (B @ A)`. Returns the number of merged weights.
pub fn merge_lora(
    base: &mut HashMap<String, Tensor>,
    adapter: &HashMap<String, Tensor>,
    scale: f64,
) -> Result<usize> {
    let mut merged = 0;
    let mut a_keys: Vec<&String> = adapter.keys().filter(|k| k.ends_with(".lora_A.weight")).collect();
    a_keys.sort();

    for a_key in a_keys {
        let (target, b_key) = lora_target(a_key).ok_or_else(|| anyhow!("bad LoRA key {}", a_key))?;
        let a = &adapter[a_key];
        let b = adapter
            .get(&b_key)
            .ok_or_else(|| anyhow!("LoRA weight {} has no matching {}", a_key, b_key))?;
        let weight = base
            .get(&target)
            .ok_or_else(|| anyhow!("LoRA adapts {} which is not in the base model", target))?;

        let delta = (b.to_dtype(DType::F32)?.matmul(&a.to_dtype(DType::F32)?)? * scale)?;
        let updated = (weight.to_dtype(DType::F32)? + delta)?.to_dtype(weight.dtype())?;
        base.insert(target, updated);
        merged += 1;
    }

    if merged == 0 {
        bail!("Adapter contains no LoRA weights");
    }
    Ok(merged)
}

/// Sampling settings for one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub seed: u64,
}

impl SamplingParams {
    fn from_config(config: &LocalConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            seed: config.seed,
        }
    }

    fn sampling(&self) -> Sampling {
        let temperature = self.temperature;
        if temperature <= 0.0 {
            Sampling::ArgMax
        } else if self.top_p > 0.0 && self.top_p < 1.0 {
            Sampling::TopP {
                p: self.top_p,
                temperature,
            }
        } else {
            Sampling::All { temperature }
        }
    }
}

/// Holds back generated text that might be the start of a stop sequence.
#[derive(Debug, Default)]
struct StopFilter {
    stops: Vec<String>,
    pending: String,
}

impl StopFilter {
    fn new(stops: &[&str]) -> Self {
        Self {
            stops: stops.iter().map(|s| s.to_string()).collect(),
            pending: String::new(),
        }
    }

    /// Feed text; returns what can be emitted and whether a stop sequence was hit.
    fn push(&mut self, text: &str) -> (String, bool) {
        self.pending.push_str(text);

        if let Some(pos) = self.stops.iter().filter_map(|s| self.pending.find(s.as_str())).min() {
            let out = self.pending[..pos].to_string();
            self.pending.clear();
            return (out, true);
        }

        // Longest suffix of pending that is a proper prefix of some stop sequence
        let hold = self
            .stops
            .iter()
            .flat_map(|stop| {
                stop.char_indices()
                    .skip(1)
                    .map(|(i, _)| &stop[..i])
                    .filter(|prefix| self.pending.ends_with(prefix))
                    .map(|prefix| prefix.len())
                    .collect::<Vec<_>>()
            })
            .max()
            .unwrap_or(0);

        let cut = self.pending.len() - hold;
        let out = self.pending[..cut].to_string();
        self.pending.drain(..cut);
        (out, false)
    }

    fn finish(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }
}

/// Incremental detokenizer: emits only text that is stable across further tokens.
#[derive(Debug, Default)]
struct TokenDecoder {
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl TokenDecoder {
    fn decode(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
        tokenizer.decode(ids, true).map_err(anyhow::Error::msg)
    }

    fn next(&mut self, tokenizer: &Tokenizer, token: u32) -> Result<Option<String>> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            Self::decode(tokenizer, &self.tokens[self.prev_index..self.current_index])?
        };
        self.tokens.push(token);
        let text = Self::decode(tokenizer, &self.tokens[self.prev_index..])?;

        // A trailing replacement char means a multi-byte character is still incomplete
        if text.len() > prev_text.len() && !text.ends_with('\u{FFFD}') {
            if let Some(new) = text.get(prev_text.len()..) {
                let new = new.to_string();
                self.prev_index = self.current_index;
                self.current_index = self.tokens.len();
                return Ok(Some(new));
            }
        }
        Ok(None)
    }

    fn rest(&self, tokenizer: &Tokenizer) -> Result<Option<String>> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            Self::decode(tokenizer, &self.tokens[self.prev_index..self.current_index])?
        };
        let text = Self::decode(tokenizer, &self.tokens[self.prev_index..])?;
        Ok(text
            .get(prev_text.len()..)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string))
    }
}

/// Immutable model state shared by every request.
struct LocalModel {
    llama: Llama,
    config: LlamaModelConfig,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    template: TemplateKind,
    eos_ids: Vec<u32>,
    params: SamplingParams,
}

impl LocalModel {
    fn load(config: &LocalConfig) -> Result<Self> {
        let device = if config.use_gpu {
            Device::cuda_if_available(0)?
        } else {
            Device::Cpu
        };
        let dtype = if device.is_cuda() {
            DType::BF16
        } else {
            DType::F32
        };

        let source = resolve_source(config);
        info!(?source, "Loading local model");

        let (files, adapter) = match &source {
            ModelSource::Directory(dir) => (directory_files(dir)?, None),
            ModelSource::Hub(model_id) => (hub_files(model_id)?, None),
            ModelSource::Adapter {
                adapter_dir,
                base_model,
            } => (hub_files(base_model)?, Some(adapter_dir.clone())),
        };

        let llama_config: LlamaConfig = serde_json::from_slice(
            &fs::read(&files.config)
                .with_context(|| format!("Failed to read {}", files.config.display()))?,
        )
        .context("Invalid model config.json")?;
        let model_config = llama_config.into_config(false);

        let mut tensors = load_tensors(&files.weights, &device)?;

        let mut tokenizer_path = files.tokenizer.clone();
        if let Some(adapter_dir) = &adapter {
            let adapter_config = AdapterConfig::read(adapter_dir)?;
            let adapter_weights =
                load_tensors(&[adapter_dir.join(ADAPTER_WEIGHTS)], &device)?;
            let merged = merge_lora(&mut tensors, &adapter_weights, adapter_config.scale())?;
            info!(merged, scale = adapter_config.scale(), "Merged LoRA adapter");

            // Training may have added tokens
            let adapter_tokenizer = adapter_dir.join("tokenizer.json");
            if adapter_tokenizer.exists() {
                tokenizer_path = adapter_tokenizer;
            }
        }

        let tensors = tensors
            .into_iter()
            .map(|(name, t)| Ok((name, t.to_dtype(dtype)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        let vb = VarBuilder::from_tensors(tensors, dtype, &device);
        let llama = Llama::load(vb, &model_config).context("Failed to build llama model")?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(anyhow::Error::msg)?;

        let template = config.template;
        let mut eos_ids: Vec<u32> = match &model_config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => Vec::new(),
        };
        for token in template.stop_tokens() {
            if let Some(id) = tokenizer.token_to_id(token) {
                if !eos_ids.contains(&id) {
                    eos_ids.push(id);
                }
            }
        }

        Ok(Self {
            llama,
            config: model_config,
            tokenizer,
            device,
            dtype,
            template,
            eos_ids,
            params: SamplingParams::from_config(config),
        })
    }

    /// Sample a reply to `prompt`, sending text fragments as they become stable.
    fn generate_into(&self, prompt: &str, tx: &mpsc::Sender<Result<String>>) -> Result<()> {
        let mut tokens = self
            .tokenizer
            .encode(prompt, self.template.add_special_tokens())
            .map_err(anyhow::Error::msg)?
            .get_ids()
            .to_vec();

        let max_ctx = self.config.max_position_embeddings;
        if tokens.len() >= max_ctx {
            bail!(
                "Prompt is {} tokens, the model accepts at most {}",
                tokens.len(),
                max_ctx
            );
        }

        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut sampler = LogitsProcessor::from_sampling(self.params.seed, self.params.sampling());
        let mut decoder = TokenDecoder::default();
        let mut stops = StopFilter::new(self.template.stop_sequences());
        let mut index_pos = 0;
        let mut generated = 0;

        let send = |text: String| -> bool {
            text.is_empty() || tx.blocking_send(Ok(text)).is_ok()
        };

        for index in 0..self.params.max_new_tokens {
            if tokens.len() >= max_ctx {
                debug!("Context window full");
                break;
            }

            let context_size = if index > 0 { 1 } else { tokens.len() };
            let ctxt = &tokens[tokens.len() - context_size..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = self
                .llama
                .forward(&input, index_pos, &mut cache)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;
            let start_at = tokens.len().saturating_sub(REPEAT_LAST_N);
            let logits = candle_transformers::utils::apply_repeat_penalty(
                &logits,
                REPEAT_PENALTY,
                &tokens[start_at..],
            )?;
            index_pos += ctxt.len();

            let next = sampler.sample(&logits)?;
            if self.eos_ids.contains(&next) {
                break;
            }
            tokens.push(next);
            generated += 1;

            if let Some(text) = decoder.next(&self.tokenizer, next)? {
                let (out, stopped) = stops.push(&text);
                if !send(out) {
                    debug!("Stream receiver dropped, stopping generation");
                    return Ok(());
                }
                if stopped {
                    debug!(generated, "Stop sequence reached");
                    return Ok(());
                }
            }
        }

        if let Some(rest) = decoder.rest(&self.tokenizer)? {
            let (out, stopped) = stops.push(&rest);
            send(out);
            if stopped {
                return Ok(());
            }
        }
        send(stops.finish());
        debug!(generated, "Generation finished");
        Ok(())
    }
}

/// In-process generation backend.
pub struct LocalBackend {
    model: Arc<LocalModel>,
    default_model: String,
}

impl LocalBackend {
    /// Load the model. Blocking: reads (and possibly downloads) the full weights.
    pub fn load(config: &LocalConfig) -> Result<Self> {
        let model = LocalModel::load(config)?;
        let default_model = match &config.model_path {
            Some(path) => path.display().to_string(),
            None => config.base_model.clone(),
        };
        Ok(Self {
            model: Arc::new(model),
            default_model,
        })
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let prompt = self.model.template.render(&request.messages);
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let model = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || {
            if let Err(e) = model.generate_into(&prompt, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "local"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}
