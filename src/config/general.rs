use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};

fn listen() -> String {
    "0.0.0.0:4250".into()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct General {
    #[serde(default = "listen")]
    listen: String,
    /// Where reports are posted. Reports are only logged when unset.
    #[serde(default)]
    collector: Option<String>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            listen: listen(),
            collector: None,
        }
    }
}

impl General {
    pub fn check(&self) -> Result<(), String> {
        self.listen()?;

        if let Some(collector) = &self.collector {
            if !collector.starts_with("http://") {
                return Err(format!("collector must be an http:// url: {collector}"));
            }
        }

        Ok(())
    }

    pub fn listen(&self) -> Result<SocketAddr, String> {
        self.listen
            .to_socket_addrs()
            .map_err(|e| format!("bad listen address: {e}"))?
            .next()
            .ok_or_else(|| "could not resolve socket addr".to_string())
    }

    pub fn collector(&self) -> Option<&str> {
        self.collector.as_deref()
    }
}
