use std::fmt;

/// Deployment role of this process, fixed at startup.
///
/// A local server sits at an entry point, validates tickets offline and
/// pushes its validation records to the global server later. The global
/// server is the canonical store every local server syncs into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMode {
    Local { server_id: Option<String> },
    Global,
}

impl ServerMode {
    pub fn from_parts(mode: &str, local_server_id: Option<String>) -> Result<Self, String> {
        match mode {
            "local" => Ok(ServerMode::Local {
                server_id: local_server_id.filter(|id| !id.is_empty()),
            }),
            "global" => Ok(ServerMode::Global),
            other => Err(format!("Unknown SERVER_MODE '{}'", other)),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ServerMode::Local { .. })
    }

    pub fn is_global(&self) -> bool {
        matches!(self, ServerMode::Global)
    }

    /// The configured local server id, only when running in local mode.
    pub fn local_server_id(&self) -> Option<&str> {
        match self {
            ServerMode::Local { server_id } => server_id.as_deref(),
            ServerMode::Global => None,
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::Local { .. } => write!(f, "local"),
            ServerMode::Global => write!(f, "global"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_with_id() {
        let mode = ServerMode::from_parts("local", Some("gate-A".to_string())).unwrap();
        assert!(mode.is_local());
        assert!(!mode.is_global());
        assert_eq!(mode.local_server_id(), Some("gate-A"));
    }

    #[test]
    fn local_without_id_has_none() {
        let mode = ServerMode::from_parts("local", None).unwrap();
        assert!(mode.is_local());
        assert_eq!(mode.local_server_id(), None);
    }

    #[test]
    fn empty_id_treated_as_unset() {
        let mode = ServerMode::from_parts("local", Some(String::new())).unwrap();
        assert_eq!(mode.local_server_id(), None);
    }

    #[test]
    fn global_never_exposes_a_local_id() {
        let mode = ServerMode::from_parts("global", Some("gate-A".to_string())).unwrap();
        assert!(mode.is_global());
        assert_eq!(mode.local_server_id(), None);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(ServerMode::from_parts("hybrid", None).is_err());
    }
}
