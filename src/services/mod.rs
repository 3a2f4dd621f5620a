use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub mod supabase;

pub type ServiceResult<T> = Result<T, PortalError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortalError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("backend not configured")]
    Unavailable,
    #[error("{message}")]
    Backend { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// True when the backend answered (or is known to be absent), as opposed to the
    /// request never completing.
    pub fn is_backend_answer(&self) -> bool {
        !matches!(self, PortalError::Transport(_) | PortalError::Internal(_))
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(error: reqwest::Error) -> Self {
        PortalError::Transport(error.to_string())
    }
}

impl From<std::io::Error> for PortalError {
    fn from(error: std::io::Error) -> Self {
        PortalError::Storage(error.to_string())
    }
}

/// Workflow stage of an indication, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Recebido,
    Contato,
    Curadoria,
    Negociacao,
    Pagamento,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Recebido,
        Stage::Contato,
        Stage::Curadoria,
        Stage::Negociacao,
        Stage::Pagamento,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Recebido => "recebido",
            Stage::Contato => "contato",
            Stage::Curadoria => "curadoria",
            Stage::Negociacao => "negociacao",
            Stage::Pagamento => "pagamento",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Recebido => "Recebido",
            Stage::Contato => "Primeiro Contato",
            Stage::Curadoria => "Curadoria",
            Stage::Negociacao => "Negociação",
            Stage::Pagamento => "Pagamento",
        }
    }

    pub fn is_in_progress(self) -> bool {
        matches!(self, Stage::Contato | Stage::Curadoria | Stage::Negociacao)
    }

    /// Stages strictly after `current`. An unknown status sits before every stage.
    pub fn after(current: Option<Stage>) -> Vec<Stage> {
        match current {
            Some(stage) => Stage::ALL.into_iter().filter(|s| *s > stage).collect(),
            None => Stage::ALL.to_vec(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PortalError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == raw)
            .ok_or_else(|| PortalError::Validation(format!("unknown stage: {raw}")))
    }
}

/// Display label for a raw status column, falling back to the raw value.
pub fn status_label(status: &str) -> String {
    status
        .parse::<Stage>()
        .map(|stage| stage.label().to_string())
        .unwrap_or_else(|_| status.to_string())
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// RFC 3339 timestamps, or zone-less ones (`timestamp without time zone`) read as UTC.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp: {raw}")))
}

/// One row of the `indicacoes` table. Null text columns read as empty strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Indication {
    pub id: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub indicador_nome: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub indicador_email: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub cliente_nome: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub cliente_email: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub valor_projeto: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub status: String,
    #[serde(deserialize_with = "flexible_timestamp")]
    pub data_criacao: DateTime<Utc>,
    #[serde(default)]
    pub observacoes: Option<String>,
}

impl Indication {
    pub fn stage(&self) -> Option<Stage> {
        self.status.parse().ok()
    }

    /// Shallow merge: fields present in the patch overwrite, the rest stay.
    pub fn apply(&mut self, patch: &IndicationPatch) {
        if let Some(value) = &patch.indicador_nome {
            self.indicador_nome = value.clone();
        }
        if let Some(value) = &patch.indicador_email {
            self.indicador_email = value.clone();
        }
        if let Some(value) = &patch.cliente_nome {
            self.cliente_nome = value.clone();
        }
        if let Some(value) = &patch.cliente_email {
            self.cliente_email = value.clone();
        }
        if let Some(value) = &patch.valor_projeto {
            self.valor_projeto = value.clone();
        }
        if let Some(stage) = patch.status {
            self.status = stage.as_str().to_string();
        }
        if let Some(value) = &patch.observacoes {
            self.observacoes = Some(value.clone());
        }
    }
}

/// Partial update payload; `None` fields are neither sent nor merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IndicationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicador_nome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicador_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cliente_nome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cliente_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valor_projeto: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observacoes: Option<String>,
}

/// Minimal projection returned by the tracking-code lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicationRef {
    pub id: String,
    pub cliente_email: String,
}

/// Bearer token handed out by a password sign-in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    /// Epoch millis.
    pub expires_at: i64,
}

impl AccessToken {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOrder {
    pub column: String,
    pub ascending: bool,
}

impl ListOrder {
    pub fn newest_first() -> Self {
        Self {
            column: "data_criacao".into(),
            ascending: false,
        }
    }
}

pub trait IndicacoesService {
    /// Single-row lookup on `id` and `cliente_email`.
    fn find_by_code_and_email(
        &self,
        codigo: &str,
        email: &str,
    ) -> ServiceResult<Option<IndicationRef>>;
    fn list_indications(&self, order: &ListOrder) -> ServiceResult<Vec<Indication>>;
    fn update_indication(&self, id: &str, patch: &IndicationPatch) -> ServiceResult<()>;
    fn sign_in_with_password(&self, email: &str, password: &str) -> ServiceResult<AuthUser>;

    /// Token sent with later calls in place of the anonymous key; `None` reverts to it.
    fn use_access_token(&self, _token: Option<&str>) {}
}

impl<T: IndicacoesService + ?Sized> IndicacoesService for Box<T> {
    fn find_by_code_and_email(
        &self,
        codigo: &str,
        email: &str,
    ) -> ServiceResult<Option<IndicationRef>> {
        (**self).find_by_code_and_email(codigo, email)
    }

    fn list_indications(&self, order: &ListOrder) -> ServiceResult<Vec<Indication>> {
        (**self).list_indications(order)
    }

    fn update_indication(&self, id: &str, patch: &IndicationPatch) -> ServiceResult<()> {
        (**self).update_indication(id, patch)
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> ServiceResult<AuthUser> {
        (**self).sign_in_with_password(email, password)
    }

    fn use_access_token(&self, token: Option<&str>) {
        (**self).use_access_token(token)
    }
}

/// Stand-in used when no backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineService;

impl IndicacoesService for OfflineService {
    fn find_by_code_and_email(
        &self,
        _codigo: &str,
        _email: &str,
    ) -> ServiceResult<Option<IndicationRef>> {
        Err(PortalError::Unavailable)
    }

    fn list_indications(&self, _order: &ListOrder) -> ServiceResult<Vec<Indication>> {
        Err(PortalError::Unavailable)
    }

    fn update_indication(&self, _id: &str, _patch: &IndicationPatch) -> ServiceResult<()> {
        Err(PortalError::Unavailable)
    }

    fn sign_in_with_password(&self, _email: &str, _password: &str) -> ServiceResult<AuthUser> {
        Err(PortalError::Unavailable)
    }
}

#[derive(Default)]
struct InMemoryState {
    indications: Vec<Indication>,
    users: HashMap<String, (String, String)>,
    fail_with: Option<PortalError>,
    updates: usize,
    bearer: Option<String>,
}

#[derive(Clone)]
pub struct InMemoryService {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryService {
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
        }
    }

    pub fn new_with_sample() -> Self {
        let service = Self::empty();
        let samples = [
            ("HMD-2025-0001", "Ana Souza", "Carlos Lima", "25000", Stage::Recebido, 1),
            ("HMD-2025-0002", "Bruno Alves", "Daniela Rocha", "48000", Stage::Contato, 3),
            ("HMD-2025-0003", "Ana Souza", "Eduardo Reis", "12500", Stage::Curadoria, 5),
            ("HMD-2025-0004", "Fernanda Dias", "Gabriel Nunes", "90000", Stage::Negociacao, 8),
            ("HMD-2025-0005", "Bruno Alves", "Helena Costa", "33000", Stage::Pagamento, 13),
        ];
        for (id, indicador, cliente, valor, stage, day) in samples {
            service.insert(Indication {
                id: id.into(),
                indicador_nome: indicador.into(),
                indicador_email: email_for(indicador),
                cliente_nome: cliente.into(),
                cliente_email: email_for(cliente),
                valor_projeto: valor.into(),
                status: stage.as_str().into(),
                data_criacao: sample_date(day),
                observacoes: None,
            });
        }
        service.add_user("gestor@homade.com", "gestor-2025");
        service
    }

    pub fn insert(&self, indication: Indication) {
        if let Ok(mut state) = self.state.lock() {
            state.indications.push(indication);
        }
    }

    pub fn add_user(&self, email: &str, password: &str) {
        if let Ok(mut state) = self.state.lock() {
            let id = format!("user-{}", state.users.len() + 1);
            state
                .users
                .insert(email.to_string(), (id, password.to_string()));
        }
    }

    /// Every following call fails with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<PortalError>) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_with = error;
        }
    }

    pub fn get(&self, id: &str) -> Option<Indication> {
        let state = self.state.lock().ok()?;
        state.indications.iter().find(|item| item.id == id).cloned()
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().map(|state| state.updates).unwrap_or(0)
    }

    /// Token most recently handed to `use_access_token`.
    pub fn access_token(&self) -> Option<String> {
        self.state.lock().ok()?.bearer.clone()
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut InMemoryState) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PortalError::Internal("state poisoned".into()))?;
        if let Some(error) = state.fail_with.clone() {
            return Err(error);
        }
        f(&mut state)
    }
}

const MEMORY_TOKEN_TTL_MS: i64 = 60 * 60 * 1000;

fn email_for(name: &str) -> String {
    let local = name.to_lowercase().replace(' ', ".");
    format!("{local}@exemplo.com")
}

fn sample_date(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new_with_sample()
    }
}

impl IndicacoesService for InMemoryService {
    fn find_by_code_and_email(
        &self,
        codigo: &str,
        email: &str,
    ) -> ServiceResult<Option<IndicationRef>> {
        self.with_state(|state| {
            Ok(state
                .indications
                .iter()
                .find(|item| item.id == codigo && item.cliente_email == email)
                .map(|item| IndicationRef {
                    id: item.id.clone(),
                    cliente_email: item.cliente_email.clone(),
                }))
        })
    }

    fn list_indications(&self, order: &ListOrder) -> ServiceResult<Vec<Indication>> {
        self.with_state(|state| {
            let mut rows = state.indications.clone();
            match order.column.as_str() {
                "data_criacao" => rows.sort_by_key(|item| item.data_criacao),
                "id" => rows.sort_by(|a, b| a.id.cmp(&b.id)),
                other => {
                    return Err(PortalError::Backend {
                        status: 400,
                        message: format!("column indicacoes.{other} does not exist"),
                    })
                }
            }
            if !order.ascending {
                rows.reverse();
            }
            Ok(rows)
        })
    }

    fn update_indication(&self, id: &str, patch: &IndicationPatch) -> ServiceResult<()> {
        self.with_state(|state| {
            state.updates += 1;
            // Matching zero rows is not an error for an update filter.
            if let Some(row) = state.indications.iter_mut().find(|item| item.id == id) {
                row.apply(patch);
            }
            Ok(())
        })
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> ServiceResult<AuthUser> {
        self.with_state(|state| match state.users.get(email) {
            Some((id, stored)) if stored == password => Ok(AuthUser {
                id: id.clone(),
                email: email.to_string(),
                access_token: Some(AccessToken {
                    token: format!("memory-token-{id}"),
                    expires_at: Utc::now().timestamp_millis() + MEMORY_TOKEN_TTL_MS,
                }),
            }),
            _ => Err(PortalError::Backend {
                status: 400,
                message: "Invalid login credentials".into(),
            }),
        })
    }

    fn use_access_token(&self, token: Option<&str>) {
        if let Ok(mut state) = self.state.lock() {
            state.bearer = token.map(str::to_string);
        }
    }
}
