use std::env;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::services::{
    AccessToken, AuthUser, Indication, IndicationPatch, IndicationRef, ListOrder, PortalError,
};

pub const INDICACOES_TABLE: &str = "indicacoes";

const PLACEHOLDER_URL: &str = "YOUR_SUPABASE_URL";
const PLACEHOLDER_KEY: &str = "YOUR_SUPABASE_ANON_KEY";

/// Project URL and public (anon) key of the Supabase project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    /// Reads `SUPABASE_URL` and `SUPABASE_ANON_KEY`. Missing or placeholder values mean
    /// the backend is not configured.
    pub fn from_env() -> Option<Self> {
        let url = env::var("SUPABASE_URL").ok()?;
        let anon_key = env::var("SUPABASE_ANON_KEY").ok()?;
        Self::new(url, anon_key)
    }

    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Option<Self> {
        let url = normalize_endpoint(url.into());
        let anon_key = anon_key.into().trim().to_string();
        if url.is_empty() || anon_key.is_empty() {
            return None;
        }
        if url.contains(PLACEHOLDER_URL) || anon_key == PLACEHOLDER_KEY {
            return None;
        }
        Some(Self { url, anon_key })
    }
}

fn normalize_endpoint(raw: String) -> String {
    let ep = raw.trim().trim_end_matches('/').to_string();
    if ep.is_empty() || ep.starts_with("http://") || ep.starts_with("https://") {
        ep
    } else {
        format!("https://{ep}")
    }
}

/// Thin async client over the PostgREST and GoTrue endpoints used by the portal.
/// After a password sign-in, table requests carry the user's token instead of the anon key.
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    config: SupabaseConfig,
    bearer: Arc<RwLock<Option<String>>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// GoTrue's default lifetime when the response omits both expiry fields.
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    /// Epoch seconds.
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_user(self) -> AuthUser {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => at * 1000,
            (None, ttl) => {
                Utc::now().timestamp_millis() + ttl.unwrap_or(DEFAULT_TOKEN_TTL_SECS) * 1000
            }
        };
        AuthUser {
            access_token: Some(AccessToken {
                token: self.access_token,
                expires_at,
            }),
            ..self.user
        }
    }
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self, PortalError> {
        info!(url = %config.url, "configuring Supabase client");
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            config,
            bearer: Arc::new(RwLock::new(None)),
        })
    }

    pub fn set_access_token(&self, token: Option<&str>) {
        if let Ok(mut bearer) = self.bearer.write() {
            *bearer = token.map(str::to_string);
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.url)
    }

    fn anonymous(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", self.config.anon_key))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.bearer.read().ok().and_then(|bearer| bearer.clone());
        match token {
            Some(token) => builder
                .header("apikey", &self.config.anon_key)
                .header("Authorization", format!("Bearer {token}")),
            None => self.anonymous(builder),
        }
    }

    pub async fn find_by_code_and_email(
        &self,
        codigo: &str,
        email: &str,
    ) -> Result<Option<IndicationRef>, PortalError> {
        let request = self
            .http
            .get(self.rest_url(INDICACOES_TABLE))
            .query(&[
                ("select", "id,cliente_email".to_string()),
                ("id", format!("eq.{codigo}")),
                ("cliente_email", format!("eq.{email}")),
            ]);
        let response = self.authorized(request).send().await?;
        let mut rows: Vec<IndicationRef> = read_json(response).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(PortalError::Backend {
                status: 406,
                message: format!("expected a single row, got {n}"),
            }),
        }
    }

    pub async fn select_indications(
        &self,
        order: &ListOrder,
    ) -> Result<Vec<Indication>, PortalError> {
        let direction = if order.ascending { "asc" } else { "desc" };
        let request = self
            .http
            .get(self.rest_url(INDICACOES_TABLE))
            .query(&[
                ("select", "*".to_string()),
                ("order", format!("{}.{direction}", order.column)),
            ]);
        let response = self.authorized(request).send().await?;
        let rows: Vec<Indication> = read_json(response).await?;
        debug!(count = rows.len(), "fetched indications");
        Ok(rows)
    }

    pub async fn update_indication(
        &self,
        id: &str,
        patch: &IndicationPatch,
    ) -> Result<(), PortalError> {
        let request = self
            .http
            .patch(self.rest_url(INDICACOES_TABLE))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(patch);
        let response = self.authorized(request).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, PortalError> {
        let url = format!("{}/auth/v1/token", self.config.url);
        let request = self
            .http
            .post(url)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        let response = self.anonymous(request).send().await?;
        let token: TokenResponse = read_json(response).await?;
        let user = token.into_user();
        self.set_access_token(user.access_token.as_ref().map(|t| t.token.as_str()));
        debug!(user = %user.id, "signed in with password");
        Ok(user)
    }
}

async fn ensure_success(response: Response) -> Result<Response, PortalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await?;
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| {
            body.message
                .or(body.error_description)
                .or(body.msg)
                .or(body.error)
        })
        .unwrap_or(text);
    Err(PortalError::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, PortalError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| PortalError::Internal(format!("unexpected response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> SupabaseClient {
        let config = SupabaseConfig::new(server.url(), "anon-key").unwrap();
        SupabaseClient::new(config).unwrap()
    }

    #[test]
    fn placeholder_config_is_treated_as_missing() {
        assert!(SupabaseConfig::new(PLACEHOLDER_URL, PLACEHOLDER_KEY).is_none());
        assert!(SupabaseConfig::new("https://x.supabase.co", "").is_none());
        let cfg = SupabaseConfig::new("x.supabase.co/", "k").unwrap();
        assert_eq!(cfg.url, "https://x.supabase.co");
    }

    #[tokio::test]
    async fn lookup_filters_on_code_and_email() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/indicacoes")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "id,cliente_email".into()),
                Matcher::UrlEncoded("id".into(), "eq.HMD-2025-0001".into()),
                Matcher::UrlEncoded("cliente_email".into(), "eq.ana@exemplo.com".into()),
            ]))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(r#"[{"id":"HMD-2025-0001","cliente_email":"ana@exemplo.com"}]"#)
            .create_async()
            .await;

        let found = client_for(&server)
            .find_by_code_and_email("HMD-2025-0001", "ana@exemplo.com")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(found.unwrap().id, "HMD-2025-0001");
    }

    #[tokio::test]
    async fn lookup_without_rows_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/indicacoes")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let found = client_for(&server)
            .find_by_code_and_email("HMD-2025-0404", "x@y.com")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn select_orders_by_creation_date_descending() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/indicacoes")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("order".into(), "data_criacao.desc".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"id":"HMD-2025-0002","indicador_nome":"Bruno","indicador_email":"b@x.com",
                "cliente_nome":"Dani","cliente_email":"d@x.com","valor_projeto":48000,
                "status":"contato","data_criacao":"2025-01-03T12:00:00.000000+00:00",
                "observacoes":null}]"#,
            )
            .create_async()
            .await;

        let rows = client_for(&server)
            .select_indications(&ListOrder::newest_first())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].valor_projeto, "48000");
    }

    #[tokio::test]
    async fn update_surfaces_backend_message() {
        let mut server = Server::new_async().await;
        server
            .mock("PATCH", "/rest/v1/indicacoes")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.HMD-2025-0001".into()))
            .match_body(Matcher::Json(serde_json::json!({"status": "contato"})))
            .with_status(403)
            .with_body(r#"{"message":"permission denied for table indicacoes"}"#)
            .create_async()
            .await;

        let patch = IndicationPatch {
            status: Some(crate::services::Stage::Contato),
            ..Default::default()
        };
        let err = client_for(&server)
            .update_indication("HMD-2025-0001", &patch)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PortalError::Backend {
                status: 403,
                message: "permission denied for table indicacoes".into()
            }
        );
    }

    #[tokio::test]
    async fn password_sign_in_returns_user() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .match_body(Matcher::PartialJson(serde_json::json!({"password": "certa"})))
            .with_status(200)
            .with_body(
                r#"{"access_token":"t","token_type":"bearer","expires_in":3600,
                "expires_at":1735693200,"user":{"id":"u-1","email":"gestor@homade.com"}}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({"password": "errada"})))
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let user = client
            .sign_in_with_password("gestor@homade.com", "certa")
            .await
            .unwrap();
        assert_eq!(user.email, "gestor@homade.com");
        assert_eq!(
            user.access_token,
            Some(AccessToken {
                token: "t".into(),
                expires_at: 1_735_693_200_000
            })
        );

        let err = client
            .sign_in_with_password("gestor@homade.com", "errada")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid login credentials"));
    }

    #[tokio::test]
    async fn writes_after_sign_in_carry_the_user_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(
                r#"{"access_token":"user-jwt","expires_in":3600,
                "user":{"id":"u-1","email":"gestor@homade.com"}}"#,
            )
            .create_async()
            .await;
        let update = server
            .mock("PATCH", "/rest/v1/indicacoes")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.HMD-2025-0001".into()))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer user-jwt")
            .with_status(204)
            .create_async()
            .await;
        let anonymous_list = server
            .mock("GET", "/rest/v1/indicacoes")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = client_for(&server);
        client
            .sign_in_with_password("gestor@homade.com", "certa")
            .await
            .unwrap();
        let patch = IndicationPatch {
            observacoes: Some("ok".into()),
            ..Default::default()
        };
        client.update_indication("HMD-2025-0001", &patch).await.unwrap();
        update.assert_async().await;

        client.set_access_token(None);
        client
            .select_indications(&ListOrder::newest_first())
            .await
            .unwrap();
        anonymous_list.assert_async().await;
    }

    #[tokio::test]
    async fn restored_token_is_used_for_reads() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/indicacoes")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer stored-jwt")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = client_for(&server);
        client.set_access_token(Some("stored-jwt"));
        let rows = client
            .select_indications(&ListOrder::newest_first())
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(rows.is_empty());
    }
}
