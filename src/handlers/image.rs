use crate::config::Config;
use crate::envelope::ResultEnvelope;
use crate::models::{
    ChatCompletionRequest, ChatMessage, GenerateImageArgs, GenerationRequest, ParameterEncoding,
};
use crate::storage;
use crate::upstream::{UpstreamClient, UpstreamReply};
use crate::validate;
use crate::Result;
use tracing::{error, info};

/// Validate raw tool arguments and run the generation.
pub async fn generate_image(
    upstream: &UpstreamClient,
    config: &Config,
    args: GenerateImageArgs,
) -> ResultEnvelope {
    match validate::validate_generation(args, config) {
        Ok(request) => run_generation(upstream, config, &request).await,
        Err(e) => {
            info!("Rejected generate_image call: {}", e);
            ResultEnvelope::failure(&e)
        }
    }
}

/// Generate, then download and save when a file name was given.
pub async fn run_generation(
    upstream: &UpstreamClient,
    config: &Config,
    request: &GenerationRequest,
) -> ResultEnvelope {
    let url = match request_locator(upstream, config, request).await {
        Ok(url) => url,
        Err(e) => {
            error!("Image generation failed: {}", e);
            return ResultEnvelope::failure(&e);
        }
    };
    info!("Upstream returned image locator {}", url);

    let Some(file_name) = request.file_name.as_deref() else {
        return ResultEnvelope::success(url, Vec::new(), None);
    };

    let asset = match upstream.fetch_image(&url).await {
        Ok(asset) => asset,
        Err(e) => {
            error!("Image download failed: {}", e);
            return ResultEnvelope::failure_with_url(&e, url);
        }
    };

    let folder = request
        .save_folder
        .as_deref()
        .unwrap_or(config.save_folder.as_path());
    let persisted = storage::save_image(folder, file_name, &asset).await;

    ResultEnvelope::success(url, persisted.paths(), persisted.warning())
}

async fn request_locator(
    upstream: &UpstreamClient,
    config: &Config,
    request: &GenerationRequest,
) -> Result<String> {
    let body = build_upstream_request(request, config.parameter_encoding);
    let reply = upstream.chat_completion(&body).await?;
    UpstreamReply::from_value(&reply).image_locator()
}

/// Chat-completions body for an image request.
///
/// With [`ParameterEncoding::PromptPrefix`] a caller-chosen ratio is written in
/// front of the prompt and no `aspect_ratio` field is sent. The other knobs
/// are structured fields in both modes.
pub fn build_upstream_request(
    request: &GenerationRequest,
    encoding: ParameterEncoding,
) -> ChatCompletionRequest {
    let (content, aspect_ratio) = match encoding {
        ParameterEncoding::Structured => {
            (request.prompt.clone(), Some(request.resolved_aspect_ratio()))
        }
        ParameterEncoding::PromptPrefix => match request.aspect_ratio {
            Some(ratio) => (format!("{} {}", ratio, request.prompt), None),
            None => (request.prompt.clone(), None),
        },
    };

    ChatCompletionRequest {
        messages: vec![ChatMessage::user(content)],
        seed: request.seed,
        num_steps: Some(request.num_inference_steps),
        aspect_ratio,
        disable_safety_checker: Some(request.disable_safety_checker),
        width: request.width,
        height: request.height,
        stream: false,
    }
}
