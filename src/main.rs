use std::env;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use homade_indicacoes::config::PortalConfig;
use homade_indicacoes::controller::admin_login::{AdminLoginContext, AdminLoginController};
use homade_indicacoes::controller::dashboard::{
    DashboardContext, DashboardController, EditForm, Modal,
};
use homade_indicacoes::controller::tracking_login::{
    TrackingLoginContext, TrackingLoginController,
};
use homade_indicacoes::controller::{LoginOutcome, LoginPageState, Redirect};
use homade_indicacoes::services::{IndicacoesService, Stage};
use homade_indicacoes::validation::format_codigo_input;

const USAGE: &str = "usage: indicacoes <command>
  admin-login <email> <password>
  tracking-login <email> <codigo>
  dashboard | refresh | logout
  details <id>
  edit <id> [campo=valor ...]
  advance <id> [etapa] [observações]
  format-code <texto>";

fn main() -> ExitCode {
    dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let config = PortalConfig::from_env();
    let service = match config.service() {
        Ok(service) => service,
        Err(error) => {
            eprintln!("backend -> {error}");
            return ExitCode::FAILURE;
        }
    };
    let sessions = config.sessions();

    match (command.as_str(), rest) {
        ("admin-login", [email, password]) => {
            let controller = AdminLoginController::new(service, sessions);
            let mut ctx = AdminLoginContext::with_credentials(email, password);
            if let Some(redirect) = controller.on_load(&mut ctx) {
                follow(&redirect);
                return ExitCode::SUCCESS;
            }
            let outcome = controller.submit(&mut ctx);
            finish_login(&ctx.page, outcome)
        }
        ("tracking-login", [email, codigo]) => {
            let controller = TrackingLoginController::new(service, sessions);
            let mut ctx = TrackingLoginContext::default();
            if let Some(redirect) = controller.on_load(&mut ctx) {
                follow(&redirect);
                return ExitCode::SUCCESS;
            }
            controller.on_email_input(&mut ctx, email);
            controller.on_codigo_input(&mut ctx, codigo);
            let outcome = controller.submit(&mut ctx);
            finish_login(&ctx.page, outcome)
        }
        ("format-code", [raw]) => {
            println!("{}", format_codigo_input(raw));
            ExitCode::SUCCESS
        }
        (page_command, args) => {
            let controller = DashboardController::new(service, sessions);
            let mut ctx = DashboardContext::default();
            if let Some(redirect) = controller.open(&mut ctx) {
                follow(&redirect);
                return ExitCode::FAILURE;
            }
            let handled = dashboard_command(&controller, &mut ctx, page_command, args);
            print_notifications(&ctx);
            if handled {
                ExitCode::SUCCESS
            } else {
                eprintln!("{USAGE}");
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dashboard_command<S: IndicacoesService>(
    controller: &DashboardController<S>,
    ctx: &mut DashboardContext,
    command: &str,
    args: &[String],
) -> bool {
    match (command, args) {
        ("dashboard", []) => print_dashboard(ctx),
        ("refresh", []) => {
            controller.refresh(ctx);
            print_dashboard(ctx);
        }
        ("logout", []) => {
            let redirect = controller.logout(ctx);
            follow(&redirect);
        }
        ("details", [id]) => {
            if controller.show_details(ctx, id) {
                if let Some(Modal::Details(details)) = &ctx.modal {
                    println!("ID: {}", details.id);
                    println!("Indicador: {}", details.indicador);
                    println!("Cliente: {}", details.cliente);
                    println!("Valor do Projeto: {}", details.valor_projeto);
                    println!("Status: {}", details.status_label);
                    println!("Data de Criação: {}", details.data_criacao);
                    println!("Observações: {}", details.observacoes);
                }
            } else {
                eprintln!("indicação {id} não encontrada");
            }
        }
        ("edit", [id, assignments @ ..]) => {
            let Some(mut form) = controller.begin_edit(ctx, id) else {
                eprintln!("indicação {id} não encontrada");
                return true;
            };
            for assignment in assignments {
                if let Err(message) = assign(&mut form, assignment) {
                    eprintln!("{message}");
                    controller.close_modal(ctx);
                    return true;
                }
            }
            controller.save_edit(ctx, form);
            print_dashboard(ctx);
        }
        ("advance", [id, rest @ ..]) => {
            let Some(dialog) = controller.begin_advance(ctx, id) else {
                eprintln!("indicação {id} não encontrada");
                return true;
            };
            println!("Indicação: {}", dialog.id);
            println!("Cliente: {}", dialog.cliente_nome);
            println!("Etapa atual: {}", dialog.current_label);
            let choices: Vec<_> = dialog.choices.iter().map(|s| s.as_str()).collect();
            println!("Próximas etapas: {}", choices.join(", "));
            let next = rest.first().and_then(|raw| raw.parse::<Stage>().ok());
            let notes = rest.get(1..).map(|words| words.join(" ")).unwrap_or_default();
            controller.confirm_advance(ctx, next, &notes);
        }
        _ => return false,
    }
    true
}

fn assign(form: &mut EditForm, assignment: &str) -> Result<(), String> {
    let (field, value) = assignment
        .split_once('=')
        .ok_or_else(|| format!("esperado campo=valor, recebido {assignment}"))?;
    let value = value.to_string();
    match field {
        "indicador_nome" => form.indicador_nome = value,
        "indicador_email" => form.indicador_email = value,
        "cliente_nome" => form.cliente_nome = value,
        "cliente_email" => form.cliente_email = value,
        "valor_projeto" => form.valor_projeto = value,
        "status" => form.status = Some(value.parse().map_err(|e| format!("{e}"))?),
        "observacoes" => form.observacoes = value,
        other => return Err(format!("campo desconhecido: {other}")),
    }
    Ok(())
}

fn finish_login(page: &LoginPageState, outcome: LoginOutcome) -> ExitCode {
    if let Some(flash) = &page.flash {
        println!("{}", flash.text);
    }
    match outcome {
        LoginOutcome::Authenticated { redirect, .. } => {
            follow(&redirect);
            ExitCode::SUCCESS
        }
        LoginOutcome::Rejected | LoginOutcome::Ignored => ExitCode::FAILURE,
    }
}

fn follow(redirect: &Redirect) {
    if redirect.delay_ms > 0 {
        thread::sleep(Duration::from_millis(redirect.delay_ms));
    }
    println!("-> {}", redirect.target.href());
}

fn print_dashboard(ctx: &DashboardContext) {
    if let Some(info) = ctx.user_info() {
        println!("{info}");
    }
    let stats = ctx.stats;
    println!(
        "Total: {}  Recebidas: {}  Em andamento: {}  Concluídas: {}",
        stats.total, stats.recebidas, stats.andamento, stats.concluidas
    );
    println!(
        "{:<15} {:<20} {:<20} {:>12}  {:<17} {}",
        "ID", "Indicador", "Cliente", "Valor", "Status", "Data"
    );
    for row in &ctx.rows {
        println!(
            "{:<15} {:<20} {:<20} {:>12}  {:<17} {}",
            row.id,
            row.indicador_nome,
            row.cliente_nome,
            row.valor_projeto,
            row.status_label,
            row.data_criacao
        );
    }
}

fn print_notifications(ctx: &DashboardContext) {
    if let Some(last) = ctx.notifications.last() {
        println!("[{}] {}", last.kind.css_class(), last.message);
    }
}
