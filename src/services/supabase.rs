use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::error;

use crate::services::{
    AuthUser, IndicacoesService, Indication, IndicationPatch, IndicationRef, ListOrder,
    PortalError, ServiceResult,
};
use crate::supabase::SupabaseClient;

/// Supabase-backed service. Calls block the page thread until the request finishes.
#[derive(Clone)]
pub struct SupabaseService {
    client: SupabaseClient,
    runtime: Arc<Runtime>,
}

impl SupabaseService {
    pub fn new(client: SupabaseClient) -> ServiceResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| PortalError::Internal(format!("runtime init failed: {e}")))?;
        Ok(Self {
            client,
            runtime: Arc::new(runtime),
        })
    }

    fn block_on<T>(&self, op: &str, fut: impl Future<Output = ServiceResult<T>>) -> ServiceResult<T> {
        self.runtime.block_on(fut).map_err(|err| {
            error!(operation = op, error = %err, "supabase call failed");
            err
        })
    }
}

impl IndicacoesService for SupabaseService {
    fn find_by_code_and_email(
        &self,
        codigo: &str,
        email: &str,
    ) -> ServiceResult<Option<IndicationRef>> {
        self.block_on(
            "find_by_code_and_email",
            self.client.find_by_code_and_email(codigo, email),
        )
    }

    fn list_indications(&self, order: &ListOrder) -> ServiceResult<Vec<Indication>> {
        self.block_on("list_indications", self.client.select_indications(order))
    }

    fn update_indication(&self, id: &str, patch: &IndicationPatch) -> ServiceResult<()> {
        self.block_on("update_indication", self.client.update_indication(id, patch))
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> ServiceResult<AuthUser> {
        self.block_on(
            "sign_in_with_password",
            self.client.sign_in_with_password(email, password),
        )
    }

    fn use_access_token(&self, token: Option<&str>) {
        self.client.set_access_token(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supabase::SupabaseConfig;
    use mockito::{Matcher, Server};

    #[test]
    fn blocking_update_reaches_the_rest_endpoint() {
        let mut server = Server::new();
        let mock = server
            .mock("PATCH", "/rest/v1/indicacoes")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.HMD-2025-0003".into()))
            .match_body(Matcher::Json(serde_json::json!({"observacoes": "ligar amanhã"})))
            .with_status(204)
            .create();

        let config = SupabaseConfig::new(server.url(), "anon").unwrap();
        let service = SupabaseService::new(SupabaseClient::new(config).unwrap()).unwrap();
        let patch = IndicationPatch {
            observacoes: Some("ligar amanhã".into()),
            ..Default::default()
        };
        service.update_indication("HMD-2025-0003", &patch).unwrap();
        mock.assert();
    }

    #[test]
    fn restored_token_reaches_the_rest_endpoint() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/rest/v1/indicacoes")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer session-jwt")
            .with_status(200)
            .with_body("[]")
            .create();

        let config = SupabaseConfig::new(server.url(), "anon").unwrap();
        let service: Box<dyn IndicacoesService> =
            Box::new(SupabaseService::new(SupabaseClient::new(config).unwrap()).unwrap());
        service.use_access_token(Some("session-jwt"));
        assert!(service
            .list_indications(&ListOrder::newest_first())
            .unwrap()
            .is_empty());
        mock.assert();
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let config = SupabaseConfig::new("http://127.0.0.1:9", "anon").unwrap();
        let service = SupabaseService::new(SupabaseClient::new(config).unwrap()).unwrap();
        let err = service
            .list_indications(&ListOrder::newest_first())
            .unwrap_err();
        assert!(matches!(err, PortalError::Transport(_)));
    }
}
