use crate::models::{ChatCompletionArgs, ChatCompletionRequest, ChatCompletionText};
use crate::upstream::{reply, UpstreamClient};
use crate::validate;
use crate::Result;

/// Validate the prompt and return the worker's text answer.
///
/// A reply without message content is returned verbatim rather than failing.
pub async fn get_chat_completion(
    upstream: &UpstreamClient,
    args: ChatCompletionArgs,
) -> Result<ChatCompletionText> {
    let prompt = validate::validate_chat(args)?;
    let request = ChatCompletionRequest::user_prompt(prompt);

    let value = upstream.chat_completion(&request).await?;

    Ok(ChatCompletionText {
        text: reply::completion_text(&value),
    })
}
