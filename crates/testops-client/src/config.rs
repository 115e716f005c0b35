/// Connection settings for the TestOps API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub token: String,
    /// `qase.io` for the hosted service, or the host of a dedicated instance.
    pub host: String,
    /// Whether failed results should be filed as defects.
    pub defect: bool,
    pub timeout_seconds: u64,
}

impl ClientConfig {
    pub const DEFAULT_HOST: &'static str = "qase.io";

    pub fn new(token: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            host: host.into(),
            defect: false,
            timeout_seconds: 60,
        }
    }

    pub fn with_defect(mut self, defect: bool) -> Self {
        self.defect = defect;
        self
    }

    pub fn api_url(&self, version: u8) -> String {
        if self.host == Self::DEFAULT_HOST {
            format!("https://api.qase.io/v{}", version)
        } else {
            format!("https://api-{}/v{}", self.host, version)
        }
    }

    pub fn app_url(&self) -> String {
        if self.host == Self::DEFAULT_HOST {
            "https://app.qase.io".to_string()
        } else {
            format!("https://{}", self.host)
        }
    }
}

/// Identifies the reporter to the server via `X-Client` / `X-Platform`.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub reporter_name: Option<String>,
    pub reporter_version: Option<String>,
    pub framework: Option<String>,
    pub framework_version: Option<String>,
    pub core_version: Option<String>,
}

impl ClientInfo {
    pub fn new(framework: impl Into<String>, reporter_name: impl Into<String>) -> Self {
        Self {
            reporter_name: Some(reporter_name.into()),
            framework: Some(framework.into()),
            core_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            ..Self::default()
        }
    }
}
