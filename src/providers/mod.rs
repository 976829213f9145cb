//! Provider subsystem for remote inference backends.
//!
//! Each backend implements the [`Provider`] trait defined in [`traits`] and
//! is registered in the factory function [`create_provider`] by its canonical
//! string key. Error bodies from providers pass through [`sanitize_api_error`]
//! before reaching logs so credentials never leak.

pub mod openai;
pub mod traits;

pub use traits::Provider;

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Covers OpenAI-style `sk-` keys and Telegram bot tokens embedded in
/// request URLs (`bot<id>:<secret>`).
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 2] = ["sk-", "bot"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            // Telegram tokens always carry a ':' separator; a bare "bot"
            // followed by a word is ordinary prose and stays untouched.
            if prefix == "bot" && !scrubbed[content_start..end].contains(':') {
                search_from = end;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Factory: create a provider by its canonical name.
pub fn create_provider(
    name: &str,
    api_key: &str,
    api_url: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    match name {
        "openai" => Ok(Box::new(openai::OpenAiProvider::new(api_key, api_url))),
        _ => anyhow::bail!("Unknown provider: {name}. Only \"openai\" is currently supported."),
    }
}
