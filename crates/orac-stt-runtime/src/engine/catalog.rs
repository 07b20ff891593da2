//! Fixed catalog of whisper models the engine can serve.

/// One selectable whisper model.
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    /// Public model name used by the admin API and `MODEL_NAME`.
    pub name: &'static str,
    /// ggml weights filename under the models directory.
    pub file: &'static str,
    pub size_mb: u32,
    pub description: &'static str,
}

/// Known models, smallest first.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "whisper-tiny",
        file: "ggml-tiny.bin",
        size_mb: 75,
        description: "Fastest inference, basic accuracy",
    },
    ModelInfo {
        name: "whisper-base",
        file: "ggml-base.bin",
        size_mb: 142,
        description: "Good balance of speed/accuracy",
    },
    ModelInfo {
        name: "whisper-small",
        file: "ggml-small.bin",
        size_mb: 466,
        description: "Better accuracy, slower",
    },
    ModelInfo {
        name: "whisper-medium",
        file: "ggml-medium.bin",
        size_mb: 1500,
        description: "Best accuracy, much slower",
    },
    ModelInfo {
        name: "whisper-large",
        file: "ggml-large-v3.bin",
        size_mb: 2900,
        description: "Large v3 weights, highest accuracy",
    },
    ModelInfo {
        name: "whisper-large-v3",
        file: "ggml-large-v3.bin",
        size_mb: 2900,
        description: "Large v3 weights, highest accuracy",
    },
];

/// Resolve a model name to its weights filename.
pub fn model_file(name: &str) -> Option<&'static str> {
    MODELS.iter().find(|m| m.name == name).map(|m| m.file)
}

pub fn is_known_model(name: &str) -> bool {
    model_file(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_resolve() {
        assert_eq!(model_file("whisper-base"), Some("ggml-base.bin"));
        assert_eq!(model_file("whisper-large-v3"), Some("ggml-large-v3.bin"));
        assert!(model_file("whisper-colossal").is_none());
        assert!(is_known_model("whisper-tiny"));
    }
}
