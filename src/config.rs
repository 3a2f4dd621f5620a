use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::services::supabase::SupabaseService;
use crate::services::{IndicacoesService, InMemoryService, OfflineService, ServiceResult};
use crate::session::{FileStorage, SessionStore, SystemClock};
use crate::supabase::{SupabaseClient, SupabaseConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendMode {
    Supabase,
    Memory,
}

/// Portal configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub backend: BackendMode,
    pub supabase: Option<SupabaseConfig>,
    pub session_dir: PathBuf,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        let backend = match env::var("INDICACOES_BACKEND").as_deref() {
            Ok("memory") => BackendMode::Memory,
            Ok("supabase") | Err(_) => BackendMode::Supabase,
            Ok(other) => {
                warn!(value = other, "unknown INDICACOES_BACKEND, using supabase");
                BackendMode::Supabase
            }
        };
        let session_dir = env::var("INDICACOES_SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".indicacoes"));

        Self {
            backend,
            supabase: SupabaseConfig::from_env(),
            session_dir,
        }
    }

    /// The configured backend. Supabase mode without credentials yields an offline
    /// service, so every backend call reports it as unavailable.
    pub fn service(&self) -> ServiceResult<Box<dyn IndicacoesService>> {
        match (self.backend, &self.supabase) {
            (BackendMode::Memory, _) => {
                info!("using in-memory sample data");
                Ok(Box::new(InMemoryService::new_with_sample()))
            }
            (BackendMode::Supabase, Some(cfg)) => {
                let client = SupabaseClient::new(cfg.clone())?;
                Ok(Box::new(SupabaseService::new(client)?))
            }
            (BackendMode::Supabase, None) => {
                warn!("SUPABASE_URL / SUPABASE_ANON_KEY not set; backend unavailable");
                Ok(Box::new(OfflineService))
            }
        }
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(
            Arc::new(FileStorage::new(self.session_dir.clone())),
            Arc::new(SystemClock),
        )
    }
}
