#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInput(String),

    #[error("Invalid platform configuration: {0}")]
    Configuration(String),

    #[error("Cloud provider error: {0}")]
    Cloud(String),

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Parse duration: {source}")]
    ParseDuration {
        #[from]
        source: parse_duration::parse::Error,
    },
}
