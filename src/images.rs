use rand::Rng as _;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    Client, Error, Result,
    client::{Request, Route, decode},
    types::{
        DEFAULT_DIMENSION, DEFAULT_GUIDANCE_SCALE, DEFAULT_NUM_ITERATIONS, GenerationResult,
        ImageGenerationParams, MAX_NUM_ITERATIONS, MAX_SAFE_INTEGER,
    },
};

const DEFAULT_JOB_ID_PREFIX: &str = "sdk-image";
const JOB_DEADLINE_SECONDS: u32 = 30;
const JOB_PRIORITY: u32 = 1;

/// Direct image generation on the sequencer
#[derive(Clone)]
pub struct Images {
    client: Client,
}

impl Images {
    pub(crate) fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
        }
    }

    /// Submits one generation job and waits for the image url
    ///
    /// Omitted fields are sent with their defaults: 20 iterations, guidance 7.5
    /// and a 512x512 canvas. Out of range values are rejected before anything
    /// goes over the wire.
    pub async fn generate(&self, params: ImageGenerationParams) -> Result<GenerationResult> {
        let job = SubmitJob::new(params)?;
        let metadata = job.metadata()?;

        tracing::info!(job_id = %job.body.job_id, model = %job.body.model_id, "submitting image job");

        let url = Route::new(&self.client, job).await?;
        Ok(GenerationResult { url, metadata })
    }
}

/// Rejects generation settings outside the documented ranges
pub(crate) fn check_ranges(
    num_iterations: Option<u32>,
    guidance_scale: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<()> {
    if let Some(n) = num_iterations {
        if !(1..=MAX_NUM_ITERATIONS).contains(&n) {
            return Err(Error::validation(
                "num_iterations",
                format!("{n} is outside 1..={MAX_NUM_ITERATIONS}"),
            ));
        }
    }
    if let Some(scale) = guidance_scale {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::validation(
                "guidance_scale",
                format!("{scale} is not a positive number"),
            ));
        }
    }
    if width == Some(0) {
        return Err(Error::validation("width", "must be positive"));
    }
    if height == Some(0) {
        return Err(Error::validation("height", "must be positive"));
    }
    Ok(())
}

pub(crate) fn random_hex(len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

/// Branded models expect their trigger word spelled the way they were trained on
fn rewrite_prompt(model: &str, prompt: &str) -> String {
    match model {
        "Zeek" => prompt.replace("Zeek", "z33k").replace("zeek", "z33k"),
        "Philand" => prompt.replace("Philand", "ph1land").replace("philand", "ph1land"),
        _ => prompt.to_owned(),
    }
}

struct SubmitJob {
    body: SubmitJobBody,
}

#[derive(Debug, Clone, Serialize)]
struct SubmitJobBody {
    job_id: String,
    model_input: ModelInputs,
    model_type: &'static str,
    model_id: String,
    deadline: u32,
    priority: u32,
}

#[derive(Debug, Clone, Serialize)]
struct ModelInputs {
    #[serde(rename = "SD")]
    sd: ModelInput,
}

#[derive(Debug, Clone, Serialize)]
struct ModelInput {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    neg_prompt: Option<String>,
    num_iterations: u32,
    guidance_scale: f64,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl SubmitJob {
    fn new(params: ImageGenerationParams) -> Result<Self> {
        if params.model.trim().is_empty() {
            return Err(Error::validation("model", "must not be empty"));
        }
        if params.prompt.trim().is_empty() {
            return Err(Error::validation("prompt", "must not be empty"));
        }
        check_ranges(
            params.num_iterations,
            params.guidance_scale,
            params.width,
            params.height,
        )?;

        let prefix = params
            .job_id_prefix
            .as_deref()
            .unwrap_or(DEFAULT_JOB_ID_PREFIX);

        let input = ModelInput {
            prompt: rewrite_prompt(&params.model, &params.prompt),
            neg_prompt: params.neg_prompt,
            num_iterations: params.num_iterations.unwrap_or(DEFAULT_NUM_ITERATIONS),
            guidance_scale: params.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE),
            width: params.width.unwrap_or(DEFAULT_DIMENSION),
            height: params.height.unwrap_or(DEFAULT_DIMENSION),
            seed: params.seed.map(|seed| {
                if seed > MAX_SAFE_INTEGER {
                    seed % MAX_SAFE_INTEGER
                } else {
                    seed
                }
            }),
        };

        Ok(Self {
            body: SubmitJobBody {
                job_id: format!("{prefix}-{}", random_hex(10)),
                model_input: ModelInputs { sd: input },
                model_type: "SD",
                model_id: params.model,
                deadline: JOB_DEADLINE_SECONDS,
                priority: JOB_PRIORITY,
            },
        })
    }

    fn metadata(&self) -> Result<Map<String, Value>> {
        let mut metadata = Map::new();
        metadata.insert("model".into(), self.body.model_id.clone().into());
        if let Value::Object(input) = serde_json::to_value(&self.body.model_input.sd)? {
            metadata.extend(input);
        }
        Ok(metadata)
    }
}

impl Request for SubmitJob {
    type Model = String;
    type Body = SubmitJobBody;

    fn format_uri(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str("submit_job")
    }

    fn body(&self) -> Option<Self::Body> {
        Some(self.body.clone())
    }

    /// The sequencer answers with the bare url, sometimes JSON quoted. A JSON
    /// object with a `url` field is accepted as well.
    fn parse(raw: &str) -> Result<String> {
        let raw = raw.trim();
        let url = match raw.chars().next() {
            Some('"') => Some(decode::<String>(raw)?),
            Some('{') => decode::<Value>(raw)?
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => Some(raw.to_owned()),
        };

        url.map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::ResponseFormat("response carries no image url".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(params: ImageGenerationParams) -> Value {
        serde_json::to_value(SubmitJob::new(params).unwrap().body).unwrap()
    }

    #[test]
    fn omitted_fields_get_defaults() {
        let body = body(ImageGenerationParams::new("FLUX.1-dev", "A serene landscape"));

        assert_eq!(body["model_id"], "FLUX.1-dev");
        assert_eq!(body["model_type"], "SD");
        assert_eq!(body["deadline"], 30);
        assert_eq!(body["priority"], 1);
        assert_eq!(
            body["model_input"]["SD"],
            serde_json::json!({
                "prompt": "A serene landscape",
                "num_iterations": 20,
                "guidance_scale": 7.5,
                "width": 512,
                "height": 512,
            })
        );

        let job_id = body["job_id"].as_str().unwrap();
        let suffix = job_id.strip_prefix("sdk-image-").unwrap();
        assert_eq!(suffix.len(), 10);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn supplied_fields_are_kept() {
        let body = body(
            ImageGenerationParams::new("FLUX.1-dev", "A city")
                .neg_prompt("blurry")
                .num_iterations(30)
                .guidance_scale(4.0)
                .size(768, 512)
                .seed(12345)
                .job_id_prefix("custom-job"),
        );

        let input = &body["model_input"]["SD"];
        assert_eq!(input["neg_prompt"], "blurry");
        assert_eq!(input["num_iterations"], 30);
        assert_eq!(input["guidance_scale"], 4.0);
        assert_eq!(input["width"], 768);
        assert_eq!(input["height"], 512);
        assert_eq!(input["seed"], 12345);
        assert!(body["job_id"].as_str().unwrap().starts_with("custom-job-"));
    }

    #[test]
    fn oversized_seed_wraps() {
        let body = body(ImageGenerationParams::new("m", "p").seed(MAX_SAFE_INTEGER + 5));
        assert_eq!(body["model_input"]["SD"]["seed"], 5);
    }

    #[test]
    fn branded_models_rewrite_trigger_words() {
        assert_eq!(
            rewrite_prompt("Zeek", "Zeek style, zeek forest"),
            "z33k style, z33k forest"
        );
        assert_eq!(rewrite_prompt("Philand", "philand at sea"), "ph1land at sea");
        assert_eq!(rewrite_prompt("FLUX.1-dev", "Zeek"), "Zeek");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            ImageGenerationParams::new("", "p"),
            ImageGenerationParams::new("m", "  "),
            ImageGenerationParams::new("m", "p").num_iterations(0),
            ImageGenerationParams::new("m", "p").num_iterations(51),
            ImageGenerationParams::new("m", "p").guidance_scale(0.0),
            ImageGenerationParams::new("m", "p").guidance_scale(f64::NAN),
            ImageGenerationParams::new("m", "p").size(0, 512),
        ];

        for params in cases {
            assert!(matches!(
                SubmitJob::new(params),
                Err(Error::Validation { .. })
            ));
        }
    }

    #[test]
    fn url_parsing_accepts_text_quoted_and_object() {
        assert_eq!(SubmitJob::parse("http://img/1.png\n").unwrap(), "http://img/1.png");
        assert_eq!(SubmitJob::parse("\"http://img/2.png\"").unwrap(), "http://img/2.png");
        assert_eq!(
            SubmitJob::parse(r#"{"url":"http://img/3.png"}"#).unwrap(),
            "http://img/3.png"
        );
        assert!(matches!(
            SubmitJob::parse(r#"{"status":"ok"}"#),
            Err(Error::ResponseFormat(_))
        ));
        assert!(matches!(SubmitJob::parse(""), Err(Error::ResponseFormat(_))));
    }
}
