#![allow(dead_code)]

pub mod mock_upstream;

use tollgate_config::Config;
use tollgate_gateway::Gateway;

/// Routing section shared by every scenario
///
/// `code` prefers the expensive model; `general` has a single cheap one.
/// Prices are USD per 1K tokens and token counts use the four-characters
/// heuristic, so a 400-character prompt is 100 tokens.
const ROUTING: &str = r#"
[routing]
tokenizer = "heuristic"

[routing.task_models]
general = ["cheap"]
code = ["big", "cheap"]

[routing.prices]
big = 15.0
cheap = 8.0
"#;

/// Configuration with no backends, so responses are synthesized offline
pub fn offline_config(extra: &str) -> Config {
    Config::from_toml_str(&format!("{ROUTING}\n{extra}")).expect("valid offline config")
}

/// Configuration pointing the executor at `base_url`
pub fn upstream_config(base_url: &str, extra: &str) -> Config {
    let raw = format!(
        r#"{ROUTING}
{extra}

[executor]
max_attempts = 3
retry_backoff_ms = 1

[executor.upstream]
base_url = "{base_url}"
api_key = "test-key"
timeout_secs = 5
"#
    );
    Config::from_toml_str(&raw).expect("valid upstream config")
}

pub fn gateway(config: &Config) -> Gateway {
    Gateway::from_config(config).expect("gateway builds")
}

/// Prompt of exactly `chars` characters made of short words
pub fn prompt_of(chars: usize) -> String {
    let mut prompt = "data ".repeat(chars / 5 + 1);
    prompt.truncate(chars);
    prompt
}
