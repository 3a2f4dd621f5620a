use serde::Serialize;
use tracing::{error, info, warn};

use crate::controller::{Page, Redirect};
use crate::notify::NotificationCenter;
use crate::services::{
    status_label, IndicacoesService, Indication, IndicationPatch, ListOrder, PortalError, Stage,
};
use crate::session::{Session, SessionKind, SessionStore};

const MSG_EDIT_OK: &str = "Indicação atualizada com sucesso!";
const MSG_EDIT_FAILED: &str = "Erro ao atualizar informações.";
const MSG_PICK_STAGE: &str = "Por favor, selecione a próxima etapa";
const MSG_ADVANCE_FAILED: &str = "Erro ao avançar etapa.";
const MSG_REFRESHED: &str = "Dados atualizados com sucesso!";
const NO_NOTES: &str = "Nenhuma observação";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub recebidas: usize,
    pub andamento: usize,
    pub concluidas: usize,
}

impl DashboardStats {
    pub fn from_indications(items: &[Indication]) -> Self {
        let mut stats = Self {
            total: items.len(),
            ..Default::default()
        };
        for stage in items.iter().filter_map(Indication::stage) {
            match stage {
                Stage::Recebido => stats.recebidas += 1,
                Stage::Pagamento => stats.concluidas += 1,
                s if s.is_in_progress() => stats.andamento += 1,
                _ => {}
            }
        }
        stats
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub id: String,
    pub indicador_nome: String,
    pub cliente_nome: String,
    pub valor_projeto: String,
    /// Raw status, used as the badge style suffix.
    pub status: String,
    pub status_label: String,
    pub data_criacao: String,
}

impl TableRow {
    fn from_indication(item: &Indication) -> Self {
        Self {
            id: item.id.clone(),
            indicador_nome: item.indicador_nome.clone(),
            cliente_nome: item.cliente_nome.clone(),
            valor_projeto: item.valor_projeto.clone(),
            status: item.status.clone(),
            status_label: status_label(&item.status),
            data_criacao: format_date(item),
        }
    }

    pub fn badge_class(&self) -> String {
        format!("status-badge status-{}", self.status)
    }
}

fn format_date(item: &Indication) -> String {
    item.data_criacao.format("%d/%m/%Y").to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndicationDetails {
    pub id: String,
    pub indicador: String,
    pub cliente: String,
    pub valor_projeto: String,
    pub status_label: String,
    pub data_criacao: String,
    pub observacoes: String,
}

/// Edit dialog fields; every field is sent on save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditForm {
    pub indicador_nome: String,
    pub indicador_email: String,
    pub cliente_nome: String,
    pub cliente_email: String,
    pub valor_projeto: String,
    /// `None` while the record's status is not a known stage and the user has not picked
    /// one; the status column is then left untouched.
    pub status: Option<Stage>,
    pub observacoes: String,
}

impl EditForm {
    fn prefill(item: &Indication) -> Self {
        Self {
            indicador_nome: item.indicador_nome.clone(),
            indicador_email: item.indicador_email.clone(),
            cliente_nome: item.cliente_nome.clone(),
            cliente_email: item.cliente_email.clone(),
            valor_projeto: item.valor_projeto.clone(),
            status: item.stage(),
            observacoes: item.observacoes.clone().unwrap_or_default(),
        }
    }

    fn into_patch(self) -> IndicationPatch {
        IndicationPatch {
            indicador_nome: Some(self.indicador_nome),
            indicador_email: Some(self.indicador_email),
            cliente_nome: Some(self.cliente_nome),
            cliente_email: Some(self.cliente_email),
            valor_projeto: Some(self.valor_projeto),
            status: self.status,
            observacoes: Some(self.observacoes),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvanceDialog {
    pub id: String,
    pub cliente_nome: String,
    pub valor_projeto: String,
    pub current_label: String,
    pub choices: Vec<Stage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modal {
    Details(IndicationDetails),
    Edit(EditForm),
    Advance(AdvanceDialog),
}

/// Everything the dashboard page holds between events.
#[derive(Clone, Debug, Default)]
pub struct DashboardContext {
    pub current_user: Option<Session>,
    pub indications: Vec<Indication>,
    pub stats: DashboardStats,
    pub rows: Vec<TableRow>,
    pub editing_id: Option<String>,
    pub advancing_id: Option<String>,
    pub modal: Option<Modal>,
    pub loading: bool,
    pub notifications: NotificationCenter,
}

impl DashboardContext {
    pub fn user_info(&self) -> Option<String> {
        self.current_user
            .as_ref()
            .map(|user| format!("Logado como: {}", user.email))
    }

    fn find(&self, id: &str) -> Option<&Indication> {
        self.indications.iter().find(|item| item.id == id)
    }

    fn patch_local(&mut self, id: &str, patch: &IndicationPatch) {
        if let Some(item) = self.indications.iter_mut().find(|item| item.id == id) {
            item.apply(patch);
        }
    }
}

pub struct DashboardController<S: IndicacoesService> {
    service: S,
    sessions: SessionStore,
}

impl<S: IndicacoesService> DashboardController<S> {
    pub fn new(service: S, sessions: SessionStore) -> Self {
        Self { service, sessions }
    }

    /// Access guard followed by the initial load. Returns the redirect when the admin
    /// session is missing, expired or unreadable.
    pub fn open(&self, ctx: &mut DashboardContext) -> Option<Redirect> {
        let session = match self.sessions.require_active(SessionKind::Admin) {
            Ok(Some(session)) => session,
            Ok(None) => return Some(Redirect::now(Page::AdminLogin)),
            Err(err) => {
                warn!(error = %err, "admin session unreadable");
                return Some(Redirect::now(Page::AdminLogin));
            }
        };
        if let Some(token) = &session.access_token {
            if token.is_expired(self.sessions.now()) {
                info!(email = %session.email, "backend token expired, login required");
                if let Err(err) = self.sessions.clear(SessionKind::Admin) {
                    warn!(error = %err, "could not clear admin session");
                }
                return Some(Redirect::now(Page::AdminLogin));
            }
        }
        self.service
            .use_access_token(session.access_token.as_ref().map(|t| t.token.as_str()));
        ctx.current_user = Some(session);

        ctx.loading = true;
        self.load(ctx);
        self.update_statistics(ctx);
        self.render_table(ctx);
        ctx.loading = false;
        None
    }

    /// Replaces the local list with the backend's, newest first. Failures are logged and
    /// leave the list as it was.
    pub fn load(&self, ctx: &mut DashboardContext) {
        match self.service.list_indications(&ListOrder::newest_first()) {
            Ok(rows) => {
                info!(count = rows.len(), "indications loaded");
                ctx.indications = rows;
            }
            Err(err) => error!(error = %err, "failed to load indications"),
        }
    }

    pub fn update_statistics(&self, ctx: &mut DashboardContext) {
        ctx.stats = DashboardStats::from_indications(&ctx.indications);
    }

    pub fn render_table(&self, ctx: &mut DashboardContext) {
        ctx.rows = ctx.indications.iter().map(TableRow::from_indication).collect();
    }

    pub fn show_details(&self, ctx: &mut DashboardContext, id: &str) -> bool {
        let Some(item) = ctx.find(id) else {
            return false;
        };
        let details = IndicationDetails {
            id: item.id.clone(),
            indicador: format!("{} ({})", item.indicador_nome, item.indicador_email),
            cliente: format!("{} ({})", item.cliente_nome, item.cliente_email),
            valor_projeto: item.valor_projeto.clone(),
            status_label: status_label(&item.status),
            data_criacao: format_date(item),
            observacoes: item
                .observacoes
                .clone()
                .filter(|notes| !notes.is_empty())
                .unwrap_or_else(|| NO_NOTES.to_string()),
        };
        ctx.modal = Some(Modal::Details(details));
        true
    }

    pub fn begin_edit(&self, ctx: &mut DashboardContext, id: &str) -> Option<EditForm> {
        let form = EditForm::prefill(ctx.find(id)?);
        ctx.editing_id = Some(id.to_string());
        ctx.modal = Some(Modal::Edit(form.clone()));
        Some(form)
    }

    /// Sends every form field for the record being edited. The local copy is only
    /// patched after the backend accepts the write.
    pub fn save_edit(&self, ctx: &mut DashboardContext, form: EditForm) {
        let Some(id) = ctx.editing_id.take() else {
            return;
        };
        let patch = form.into_patch();
        ctx.loading = true;
        match self.service.update_indication(&id, &patch) {
            Ok(()) => {
                ctx.patch_local(&id, &patch);
                self.update_statistics(ctx);
                self.render_table(ctx);
                ctx.modal = None;
                ctx.notifications.success(MSG_EDIT_OK, self.sessions.now());
            }
            Err(err) => {
                error!(id = %id, error = %err, "failed to update indication");
                let message = match &err {
                    PortalError::Transport(_) | PortalError::Internal(_) => {
                        MSG_EDIT_FAILED.to_string()
                    }
                    other => format!("Erro ao atualizar indicação: {other}"),
                };
                ctx.notifications.error(message, self.sessions.now());
            }
        }
        ctx.loading = false;
    }

    pub fn begin_advance(&self, ctx: &mut DashboardContext, id: &str) -> Option<AdvanceDialog> {
        let item = ctx.find(id)?;
        let dialog = AdvanceDialog {
            id: item.id.clone(),
            cliente_nome: item.cliente_nome.clone(),
            valor_projeto: item.valor_projeto.clone(),
            current_label: status_label(&item.status),
            choices: Stage::after(item.stage()),
        };
        ctx.advancing_id = Some(id.to_string());
        ctx.modal = Some(Modal::Advance(dialog.clone()));
        Some(dialog)
    }

    /// Moves the record being advanced to `next`. Without a valid forward choice the
    /// dialog stays open and nothing is sent.
    pub fn confirm_advance(&self, ctx: &mut DashboardContext, next: Option<Stage>, notes: &str) {
        let Some(id) = ctx.advancing_id.clone() else {
            return;
        };
        let now = self.sessions.now();
        let allowed = ctx
            .find(&id)
            .map(|item| Stage::after(item.stage()))
            .unwrap_or_default();
        let Some(next) = next.filter(|stage| allowed.contains(stage)) else {
            ctx.notifications.error(MSG_PICK_STAGE, now);
            return;
        };

        let notes = if notes.is_empty() {
            format!("Avançado para: {}", next.label())
        } else {
            notes.to_string()
        };
        let patch = IndicationPatch {
            status: Some(next),
            observacoes: Some(notes),
            ..Default::default()
        };

        ctx.loading = true;
        match self.service.update_indication(&id, &patch) {
            Ok(()) => {
                ctx.patch_local(&id, &patch);
                self.update_statistics(ctx);
                self.render_table(ctx);
                ctx.modal = None;
                ctx.notifications
                    .success(format!("Etapa avançada para: {}", next.label()), now);
            }
            Err(err) => {
                error!(id = %id, error = %err, "failed to advance stage");
                let message = match &err {
                    PortalError::Transport(_) | PortalError::Internal(_) => {
                        MSG_ADVANCE_FAILED.to_string()
                    }
                    other => format!("Erro ao avançar etapa: {other}"),
                };
                ctx.notifications.error(message, now);
            }
        }
        ctx.loading = false;
        ctx.advancing_id = None;
    }

    pub fn refresh(&self, ctx: &mut DashboardContext) {
        ctx.loading = true;
        self.load(ctx);
        self.update_statistics(ctx);
        self.render_table(ctx);
        ctx.loading = false;
        ctx.notifications.success(MSG_REFRESHED, self.sessions.now());
    }

    /// Close button, backdrop click and Escape all land here.
    pub fn close_modal(&self, ctx: &mut DashboardContext) {
        ctx.modal = None;
    }

    pub fn logout(&self, ctx: &mut DashboardContext) -> Redirect {
        if let Err(err) = self.sessions.clear(SessionKind::Admin) {
            warn!(error = %err, "could not clear admin session");
        }
        self.service.use_access_token(None);
        ctx.current_user = None;
        Redirect::now(Page::AdminLogin)
    }
}
