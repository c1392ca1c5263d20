//! Contains every parameter and result type used in the library

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_NUM_ITERATIONS: u32 = 20;
pub const HIGH_QUALITY_NUM_ITERATIONS: u32 = 30;
pub const MAX_NUM_ITERATIONS: u32 = 50;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;
pub const DEFAULT_DIMENSION: u32 = 512;
pub const DEFAULT_IMAGE_MODEL: &str = "FLUX.1-dev";
pub const DEFAULT_LANGUAGE_MODEL: &str = "nvidia/llama-3.1-nemotron-70b-instruct";
pub const DEFAULT_NEGATIVE_PROMPT: &str = "(worst quality: 1.4), bad quality, nsfw";

/// Parameters of a direct image generation job
///
/// Only `model` and `prompt` are required, every other field falls back to a
/// documented default when the job is submitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageGenerationParams {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neg_prompt: Option<String>,
    /// 1 to 50, defaults to 20
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_iterations: Option<u32>,
    /// Strictly positive, defaults to 7.5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Prefix of the generated job id, defaults to `sdk-image`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id_prefix: Option<String>,
}

impl ImageGenerationParams {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn neg_prompt(mut self, neg_prompt: impl Into<String>) -> Self {
        self.neg_prompt = Some(neg_prompt.into());
        self
    }

    pub fn num_iterations(mut self, num_iterations: u32) -> Self {
        self.num_iterations = Some(num_iterations);
        self
    }

    pub fn guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn job_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.job_id_prefix = Some(prefix.into());
        self
    }
}

/// A generated image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub url: String,
    /// `model` plus every model input that was sent with the job
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// 20 iterations
    #[default]
    Normal,
    /// 30 iterations
    High,
}

impl Quality {
    pub fn num_iterations(self) -> u32 {
        match self {
            Quality::Normal => DEFAULT_NUM_ITERATIONS,
            Quality::High => HIGH_QUALITY_NUM_ITERATIONS,
        }
    }
}

/// Parameters of a smart generation
///
/// The four `*_level` knobs range from 1 to 5, 3 being neutral.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SmartGenParams {
    /// What the image should show, e.g. "a dog chasing a boy"
    pub description: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Defaults to `FLUX.1-dev`
    pub image_model: Option<String>,
    /// Defaults to `nvidia/llama-3.1-nemotron-70b-instruct`
    pub language_model: Option<String>,
    /// Ask for a Stable Diffusion style tag prompt instead of prose
    #[serde(default)]
    pub is_sd: bool,
    /// Kept verbatim in the final prompt
    pub must_include: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub quality: Quality,
    /// Overrides `quality` when set
    pub num_iterations: Option<u32>,
    pub guidance_scale: Option<f64>,
    /// Realism (1) to abstraction (5)
    pub stylization_level: Option<u8>,
    /// Minimalist (1) to hyper-detailed (5)
    pub detail_level: Option<u8>,
    /// Monochrome (1) to hyper-saturated (5)
    pub color_level: Option<u8>,
    /// Flat (1) to extreme dramatic lighting (5)
    pub lighting_level: Option<u8>,
    /// Stop after the parameters are derived, no image is generated
    #[serde(default)]
    pub param_only: bool,
}

impl SmartGenParams {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = Some(model.into());
        self
    }

    pub fn language_model(mut self, model: impl Into<String>) -> Self {
        self.language_model = Some(model.into());
        self
    }

    pub fn stable_diffusion(mut self) -> Self {
        self.is_sd = true;
        self
    }

    pub fn must_include(mut self, text: impl Into<String>) -> Self {
        self.must_include = Some(text.into());
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn num_iterations(mut self, num_iterations: u32) -> Self {
        self.num_iterations = Some(num_iterations);
        self
    }

    pub fn guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    pub fn levels(mut self, stylization: u8, detail: u8, color: u8, lighting: u8) -> Self {
        self.stylization_level = Some(stylization);
        self.detail_level = Some(detail);
        self.color_level = Some(color);
        self.lighting_level = Some(lighting);
        self
    }

    pub fn param_only(mut self) -> Self {
        self.param_only = true;
        self
    }
}

/// What the prompt optimization stage suggests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPrompt {
    pub prompt: String,
    pub model: String,
    pub guidance_scale: f64,
    pub negative_prompt: Option<String>,
}

impl OptimizedPrompt {
    /// Suggestions for a refined prompt: the default model, guidance 6 for
    /// Stable Diffusion and 3 for FLUX, and a quality negative prompt for SD
    pub fn suggest(prompt: String, is_sd: bool) -> Self {
        Self {
            prompt,
            model: DEFAULT_IMAGE_MODEL.into(),
            guidance_scale: if is_sd { 6.0 } else { 3.0 },
            negative_prompt: is_sd.then(|| DEFAULT_NEGATIVE_PROMPT.into()),
        }
    }

    /// Final image parameters. Whatever the caller set explicitly wins over
    /// the suggestions.
    pub fn merge(self, params: &SmartGenParams) -> ImageGenerationParams {
        ImageGenerationParams {
            model: params.image_model.clone().unwrap_or(self.model),
            prompt: self.prompt,
            neg_prompt: params.negative_prompt.clone().or(self.negative_prompt),
            num_iterations: Some(
                params
                    .num_iterations
                    .unwrap_or_else(|| params.quality.num_iterations()),
            ),
            guidance_scale: Some(params.guidance_scale.unwrap_or(self.guidance_scale)),
            width: Some(params.width.unwrap_or(DEFAULT_DIMENSION)),
            height: Some(params.height.unwrap_or(DEFAULT_DIMENSION)),
            seed: None,
            job_id_prefix: None,
        }
    }
}

/// Outcome of [crate::SmartGen::generate_image]
#[derive(Debug, Clone, PartialEq)]
pub enum SmartGenOutput {
    /// `param_only` was set, nothing was generated
    Parameters(ImageGenerationParams),
    Image {
        url: String,
        parameters: ImageGenerationParams,
    },
}

impl SmartGenOutput {
    pub fn parameters(&self) -> &ImageGenerationParams {
        match self {
            SmartGenOutput::Parameters(parameters) => parameters,
            SmartGenOutput::Image { parameters, .. } => parameters,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            SmartGenOutput::Parameters(_) => None,
            SmartGenOutput::Image { url, .. } => Some(url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowTaskType {
    #[serde(rename = "upscaler")]
    Upscaler,
    #[serde(rename = "flux-lora")]
    FluxLora,
    #[serde(rename = "txt2vid")]
    Text2Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscalerTask {
    #[serde(rename = "image")]
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxLoraTask {
    pub prompt: String,
    pub aspect_ratio: String,
    pub width: u32,
    pub height: u32,
    pub guidance: f64,
    pub steps: u32,
    pub lora_name: String,
}

impl FluxLoraTask {
    pub fn new(prompt: impl Into<String>, lora_name: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: "custom".into(),
            width: 1024,
            height: 1024,
            guidance: 6.0,
            steps: 20,
            lora_name: lora_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text2VideoTask {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    /// Number of frames
    pub length: u32,
    pub steps: u32,
    pub seed: u64,
    pub fps: u32,
    pub quality: u32,
}

impl Text2VideoTask {
    /// Defaults to 848x480, 37 frames at 24 fps and a random seed
    pub fn new(prompt: impl Into<String>) -> Self {
        use rand::Rng as _;

        Self {
            prompt: prompt.into(),
            width: 848,
            height: 480,
            length: 37,
            steps: 30,
            seed: rand::thread_rng().gen_range(0..MAX_SAFE_INTEGER),
            fps: 24,
            quality: 80,
        }
    }
}

/// Largest integer a JavaScript backend reads back exactly
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskParameters {
    Upscaler(UpscalerTask),
    FluxLora(FluxLoraTask),
    Text2Video(Text2VideoTask),
}

impl TaskParameters {
    pub fn task_type(&self) -> WorkflowTaskType {
        match self {
            TaskParameters::Upscaler(_) => WorkflowTaskType::Upscaler,
            TaskParameters::FluxLora(_) => WorkflowTaskType::FluxLora,
            TaskParameters::Text2Video(_) => WorkflowTaskType::Text2Video,
        }
    }
}

/// A job for the workflow service
///
/// Unset `consumer_id` and `api_key` fall back to the ones embedded in the
/// client key (`<consumer_id>#<api_key>`).
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTask {
    pub parameters: TaskParameters,
    pub consumer_id: Option<String>,
    pub api_key: Option<String>,
    /// Defaults to `sdk-workflow`
    pub job_id_prefix: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub workflow_id: Option<String>,
}

impl WorkflowTask {
    pub fn new(parameters: TaskParameters) -> Self {
        Self {
            parameters,
            consumer_id: None,
            api_key: None,
            job_id_prefix: None,
            timeout_seconds: None,
            workflow_id: None,
        }
    }

    pub fn upscale(image_url: impl Into<String>) -> Self {
        Self::new(TaskParameters::Upscaler(UpscalerTask {
            image_url: image_url.into(),
        }))
    }

    pub fn flux_lora(task: FluxLoraTask) -> Self {
        Self::new(TaskParameters::FluxLora(task))
    }

    pub fn text_to_video(task: Text2VideoTask) -> Self {
        Self::new(TaskParameters::Text2Video(task))
    }

    pub fn task_type(&self) -> WorkflowTaskType {
        self.parameters.task_type()
    }

    pub fn consumer_id(mut self, consumer_id: impl Into<String>) -> Self {
        self.consumer_id = Some(consumer_id.into());
        self
    }

    pub fn workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn job_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.job_id_prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Waiting,
    Running,
    Finished,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Finished, failed and canceled tasks never change again
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledTask {
    pub task_id: String,
    pub msg: String,
}
