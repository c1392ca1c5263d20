//! Smart generation: a description goes through a language model that writes
//! the image prompt, the result is then rendered by [crate::Images].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Client, Error, Result,
    client::{Request, Route, Service, decode},
    error::Stage,
    images::check_ranges,
    types::{DEFAULT_LANGUAGE_MODEL, OptimizedPrompt, SmartGenOutput, SmartGenParams},
};

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 200;

const SYSTEM_PROMPT: &str = "You are an expert in writing prompts for AI art generation. You excel at \
creating detailed and creative visual descriptions. Maintain consistent style and tone. \
Incorporating specific elements naturally. Learn from examples when provided. Always aim for \
clear, descriptive language that paints a creative picture.";

const DIMENSIONS_PREAMBLE: &str = "You should integrate descriptions about style dimensions in a \
natural way NEVER explicitly mention level number. NEVER say X/Y or Level X or dimension:X. \
NEVER copy guideline language. Let the dimension influence your word choice and descriptive \
style rather than listing them directly. Treat them as creative inspiration rather than \
technical requirements.";

const CLOSING: &str = "Return only the final prompt without any explanations or quotes. Ensure \
all specified aspects are implemented accurately.";

#[derive(Clone)]
pub struct SmartGen {
    client: Client,
}

impl SmartGen {
    pub(crate) fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
        }
    }

    /// Runs the whole pipeline: validation, prompt optimization and, unless
    /// `param_only` is set, image generation.
    ///
    /// Failures of the two remote stages come back as [Error::Pipeline] so the
    /// caller can tell which one broke. Validation failures are plain
    /// [Error::Validation] and cost no request.
    pub async fn generate_image(&self, params: SmartGenParams) -> Result<SmartGenOutput> {
        validate(&params)?;

        let optimized = self
            .request_prompt(&params)
            .await
            .map_err(Error::at(Stage::Optimizing))?;
        let parameters = optimized.merge(&params);

        if params.param_only {
            tracing::debug!("parameters only, skipping image generation");
            return Ok(SmartGenOutput::Parameters(parameters));
        }

        let image = self
            .client
            .images()
            .generate(parameters.clone())
            .await
            .map_err(Error::at(Stage::Generating))?;

        Ok(SmartGenOutput::Image {
            url: image.url,
            parameters,
        })
    }

    /// Only the optimization stage, returning the refined prompt with the
    /// suggested settings
    pub async fn optimize_prompt(&self, params: &SmartGenParams) -> Result<OptimizedPrompt> {
        validate(params)?;
        self.request_prompt(params).await
    }

    async fn request_prompt(&self, params: &SmartGenParams) -> Result<OptimizedPrompt> {
        let model = params
            .language_model
            .as_deref()
            .unwrap_or(DEFAULT_LANGUAGE_MODEL);
        tracing::info!(%model, is_sd = params.is_sd, "optimizing prompt");

        let request = OptimizePrompt {
            body: ChatCompletionRequest {
                model: model.to_owned(),
                messages: vec![
                    Message {
                        role: "system",
                        content: SYSTEM_PROMPT.to_owned(),
                    },
                    Message {
                        role: "user",
                        content: user_prompt(params),
                    },
                ],
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
            },
        };

        let completion = Route::new(&self.client, request).await?;
        let prompt = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| clean_prompt(content.trim()))
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or_else(|| {
                tracing::warn!("language model returned no prompt, using the description");
                params.description.clone()
            });

        tracing::debug!(%prompt, "prompt optimized");
        Ok(OptimizedPrompt::suggest(prompt, params.is_sd))
    }
}

fn validate(params: &SmartGenParams) -> Result<()> {
    if params.description.trim().is_empty() {
        return Err(Error::validation("description", "must not be empty"));
    }

    for (field, model) in [
        ("image_model", &params.image_model),
        ("language_model", &params.language_model),
    ] {
        if model.as_deref().is_some_and(|model| model.trim().is_empty()) {
            return Err(Error::validation(field, "must not be empty when set"));
        }
    }

    for (field, level) in [
        ("stylization_level", params.stylization_level),
        ("detail_level", params.detail_level),
        ("color_level", params.color_level),
        ("lighting_level", params.lighting_level),
    ] {
        if let Some(level) = level {
            if !(1..=5).contains(&level) {
                return Err(Error::validation(field, format!("{level} is outside 1..=5")));
            }
        }
    }

    check_ranges(
        params.num_iterations,
        params.guidance_scale,
        params.width,
        params.height,
    )
}

#[derive(Debug, Clone, Copy)]
enum Dimension {
    Stylization,
    Detail,
    Color,
    Lighting,
}

impl Dimension {
    fn name(self) -> &'static str {
        match self {
            Dimension::Stylization => "stylization",
            Dimension::Detail => "detail",
            Dimension::Color => "color",
            Dimension::Lighting => "lighting",
        }
    }

    fn scale(self) -> &'static str {
        match self {
            Dimension::Stylization => {
                "On a scale 1~5 Controls the balance between realism and stylization\n\
                 1: Photorealistic - true-to-life\n\
                 2: High realism with slight artistic touch\n\
                 3: Balanced blend of realism and artistic style\n\
                 4: Clearly stylized art\n\
                 5: Highly abstract/artistic interpretation"
            }
            Dimension::Detail => {
                "On a scale 1~5 Controls the level of detail and intricacy\n\
                 1: Minimalist, essential elements only\n\
                 2: Clean and simple\n\
                 3: Balanced detail level\n\
                 4: Rich in details\n\
                 5: Extremely intricate, hyper-detailed"
            }
            Dimension::Color => {
                "On a scale 1~5 Controls color intensity and saturation\n\
                 1: Monochromatic/grayscale\n\
                 2: Muted, subdued colors\n\
                 3: Natural, true-to-life colors\n\
                 4: Enhanced vibrancy\n\
                 5: Hyper-saturated, intense colors"
            }
            Dimension::Lighting => {
                "On a scale 1~5 Controls lighting intensity and contrast\n\
                 1: Flat, even lighting\n\
                 2: Soft, diffused illumination\n\
                 3: Natural, balanced lighting\n\
                 4: High contrast, dramatic lighting\n\
                 5: Extreme dramatic lighting"
            }
        }
    }

    /// Level 3 is the model's natural behavior and needs no guidance
    fn guideline(self, level: Option<u8>) -> Option<String> {
        let level = level.filter(|&level| level != 3)?;
        let name = self.name();
        Some(format!(
            "Dimension {}:\n{}\n\nWe want to create a prompt with {name} level {level}. \
             Think carefully. Naturally integrate this aspect into your final prompt \
             without explicitly mentioning the level number.",
            name.to_uppercase(),
            self.scale(),
        ))
    }
}

fn user_prompt(params: &SmartGenParams) -> String {
    let mut prompt = if params.is_sd {
        String::from(
            "Create a detailed visual prompt following these guidelines:\n\n\
             - Structure: comma-separated descriptive words and phrases only\n\
             - Length: maximum 15 tags\n\
             - How to emphasis a keyword: use a tag like (keyword) or (keyword:1.2) for slight boost, (keyword:1.4) for strong boost. Never boost above 1.4.\n\
             - Core elements first: subject, style, lighting, composition\n\
             - Avoid complete sentences, action words (use, make, create), or metaphors\n\
             - Be descriptive and straightforward and creative\n",
        )
    } else {
        String::from(
            "Create a detailed visual prompt following these guidelines:\n\n\
             KEY REQUIREMENTS:\n\
             - The prompt describes the contents and styles of the image. Don't say \"create an image of ...\" but just write the description.\n\
             - Keep the final prompt under 50 words\n\
             - Focus on visual elements and composition\n\
             - Be direct and straightforward\n\
             - Avoid metaphors or \"like\" comparisons\n\
             - Integrate technical terms in photography or digital illustration\n",
        )
    };

    prompt.push_str(&format!(
        "\nCORE IMAGE DESCRIPTION:\n\"{}\"\n",
        params.description
    ));

    if let Some(must_include) = params.must_include.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(&format!(
            "\nREQUIRED ELEMENTS:\nMust include this description without altering the texts: \"{must_include}\""
        ));
    }

    if !params.examples.is_empty() {
        let examples = if params.is_sd {
            params.examples.join("\n")
        } else {
            params
                .examples
                .iter()
                .enumerate()
                .map(|(i, example)| format!("{}. {example}", i + 1))
                .collect::<Vec<_>>()
                .join("\n")
        };
        prompt.push_str("\nPROMPT FORMAT REFERENCE:\nExample prompt(s) to match format: ");
        prompt.push_str(&examples);
    }

    let guidelines = [
        Dimension::Stylization.guideline(params.stylization_level),
        Dimension::Detail.guideline(params.detail_level),
        Dimension::Color.guideline(params.color_level),
        Dimension::Lighting.guideline(params.lighting_level),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    if !guidelines.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(DIMENSIONS_PREAMBLE);
        prompt.push('\n');
        prompt.push_str(&guidelines.join("\n\n"));
    }

    prompt.push_str("\n\n");
    prompt.push_str(CLOSING);
    prompt
}

static CONTENT_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""content":\s*"([^"]+)""#).expect("valid regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Turns a raw model reply into a single line prompt
///
/// Some gateways echo the whole message object back, so JSON wrapped replies
/// are unwrapped first.
fn clean_prompt(raw: &str) -> String {
    let mut prompt: String = raw.chars().filter(|c| !c.is_control()).collect();

    if prompt.starts_with('[') || prompt.starts_with('{') {
        match serde_json::from_str::<Value>(&prompt) {
            Ok(parsed) => {
                let message = match &parsed {
                    Value::Array(items) => items.first().and_then(|item| item.get("message")),
                    _ => parsed.get("message"),
                };
                if let Some(content) = message
                    .and_then(|message| message.get("content"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|content| !content.is_empty())
                {
                    prompt = content.to_owned();
                }
            }
            Err(_) => {
                if let Some(content) = CONTENT_FIELD.captures(&prompt).and_then(|c| c.get(1)) {
                    prompt = content.as_str().to_owned();
                }
            }
        }
    }

    let prompt = prompt
        .trim_matches(|c: char| matches!(c, '"' | '\'' | ' ' | '\t' | '\n' | '\r'))
        .replace("\\n", " ")
        .replace("\\\"", "\"")
        .replace(';', ",");

    WHITESPACE.replace_all(&prompt, " ").trim().to_owned()
}

struct OptimizePrompt {
    body: ChatCompletionRequest,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Reply,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    content: Option<String>,
}

impl Request for OptimizePrompt {
    type Model = ChatCompletion;
    type Body = ChatCompletionRequest;

    const SERVICE: Service = Service::Workflow;

    fn format_uri(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str("chat/completions")
    }

    fn body(&self) -> Option<Self::Body> {
        Some(self.body.clone())
    }

    fn parse(raw: &str) -> Result<ChatCompletion> {
        decode(raw)
    }
}
