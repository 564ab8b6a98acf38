//! Model naming on both sides of the bridge.
//!
//! Clients address models by familiar public ids; the IDE backend knows them
//! by internal tags. Several public ids may collapse onto one tag.

/// The only model whose length-truncated answers are continued automatically.
pub const CONTINUATION_MODEL: &str = "aws_sdk_claude37_sonnet";

struct ModelAlias {
    upstream: &'static str,
    /// Name advertised on the model listing, when it differs from the tag
    public: Option<&'static str>,
    aliases: &'static [&'static str],
}

const MODEL_ALIASES: &[ModelAlias] = &[
    ModelAlias {
        upstream: "claude3.5",
        public: Some("claude-3-5-sonnet"),
        aliases: &[
            "claude-3-5-sonnet-20240620",
            "claude-3-5-sonnet-20241022",
            "claude-3-5-sonnet",
        ],
    },
    ModelAlias {
        upstream: "aws_sdk_claude37_sonnet",
        public: Some("claude-3-7-sonnet"),
        aliases: &["claude-3-7-sonnet-20250219", "claude-3-7-sonnet", "claude-3-7"],
    },
    ModelAlias {
        upstream: "gpt-4o",
        public: None,
        aliases: &["gpt-4o-mini", "gpt-4o-mini-2024-07-18", "gpt-4o-latest"],
    },
    ModelAlias {
        upstream: "gpt-4.1-2025-04-14",
        public: None,
        aliases: &["gpt-4-1", "gpt-4.1"],
    },
    ModelAlias {
        upstream: "deepseek-V3",
        public: None,
        aliases: &["deepseek-chat", "deepseek-coder", "deepseek-v3"],
    },
    ModelAlias {
        upstream: "deepseek-R1",
        public: None,
        aliases: &["deepseek-reasoner", "deepseek-r1"],
    },
    ModelAlias {
        upstream: "deepseek-V3-0324",
        public: None,
        aliases: &["deepseek-chat-0324"],
    },
    ModelAlias {
        upstream: "gemini-2.5-pro-preview-03-25",
        public: None,
        aliases: &["gemini-2.5-pro"],
    },
    ModelAlias {
        upstream: "gemini_2.5_flash",
        public: None,
        aliases: &["gemini-2.5-flash"],
    },
];

/// Whether requests for `model` are accepted. Both public aliases and the
/// internal tags themselves are valid.
pub fn is_supported(model: &str) -> bool {
    MODEL_ALIASES
        .iter()
        .any(|entry| entry.upstream == model || entry.aliases.contains(&model))
}

/// Maps an inbound model id to the upstream tag. Unknown ids pass through.
pub fn upstream_model_name(model: &str) -> &str {
    MODEL_ALIASES
        .iter()
        .find(|entry| entry.aliases.contains(&model))
        .map(|entry| entry.upstream)
        .unwrap_or(model)
}

/// Maps an upstream catalog tag to the id advertised to clients.
pub fn public_model_name(upstream: &str) -> &str {
    MODEL_ALIASES
        .iter()
        .find(|entry| entry.upstream == upstream)
        .and_then(|entry| entry.public)
        .unwrap_or(upstream)
}
