use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{AdminApi, AdminClient};
use entity_forms::{
    selector::organization_selector, AccessGate, Admission, BookForm, EntityForm,
    EntityFormController, GateContext, NavigationContext, Navigator, OrganizationForm, Session,
    SubmitOutcome,
};
use serde::Serialize;
use shared::{
    domain::{AccessOperation, BookId},
    protocol::OrganizationQuery,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "admin", about = "Create and edit books and organizations")]
struct Cli {
    /// Overrides `api_url` from admin.toml and the environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateBook {
        /// Page location; `?organization_id=` pre-selects the organization.
        #[arg(long, default_value = "/books/create")]
        location: String,
        #[command(flatten)]
        fields: BookFields,
    },
    EditBook {
        id: String,
        #[command(flatten)]
        fields: BookFields,
    },
    CreateOrganization {
        #[arg(long)]
        name: Option<String>,
    },
    ListOrganizations {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Args, Debug, Default)]
struct BookFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    publication_year: Option<String>,
    #[arg(long)]
    organization_id: Option<String>,
}

/// Prints the route a saved form would move to.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, route: &str) {
        info!(route, "navigating");
        println!("-> {route}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url.clone() {
        settings.api_url = api_url;
    }

    run(cli.command, &settings).await
}

async fn run(command: Command, settings: &Settings) -> Result<()> {
    let mut client = AdminClient::with_timeout(&settings.api_url, settings.request_timeout())
        .with_context(|| format!("invalid api url '{}'", settings.api_url))?;
    if let Some(token) = &settings.api_token {
        client = client.with_token(token.clone());
    }
    let session = resolve_session(&client).await?;
    let api: Arc<dyn AdminApi> = Arc::new(client);
    let navigator: Arc<dyn Navigator> = Arc::new(ConsoleNavigator);

    match command {
        Command::CreateBook { location, fields } => {
            let admission = admit("book", AccessOperation::Create, session, &location)?;
            let controller =
                EntityFormController::<BookForm>::mount(admission, api.clone(), navigator);
            apply_book_fields(&controller, api, &fields).await?;
            submit(&controller).await
        }
        Command::EditBook { id, fields } => {
            let location = format!("/books/edit/{id}");
            let admission = admit("book", AccessOperation::Update, session, &location)?;
            let record = api
                .get_book_by_id(&BookId::new(id.as_str()))
                .await
                .with_context(|| format!("failed to load book {id}"))?;
            let controller = EntityFormController::<BookForm>::mount_edit(
                admission,
                api.clone(),
                navigator,
                &record,
            );
            apply_book_fields(&controller, api, &fields).await?;
            submit(&controller).await
        }
        Command::CreateOrganization { name } => {
            let admission = admit(
                "organization",
                AccessOperation::Create,
                session,
                "/organizations/create",
            )?;
            let controller =
                EntityFormController::<OrganizationForm>::mount(admission, api, navigator);
            if let Some(name) = &name {
                controller.set_field("name", name).await?;
            }
            submit(&controller).await
        }
        Command::ListOrganizations { search, limit } => {
            let query = OrganizationQuery {
                search,
                limit,
                ..OrganizationQuery::default()
            };
            let page = api
                .get_organizations(&query)
                .await
                .context("failed to list organizations")?;
            for organization in &page.data {
                println!("{}\t{}", organization.id, organization.name);
            }
            Ok(())
        }
    }
}

/// No token means no session; a rejected token is treated the same way.
async fn resolve_session(client: &AdminClient) -> Result<Option<Session>> {
    if !client.has_token() {
        return Ok(None);
    }
    match client.current_principal().await {
        Ok(principal) => Ok(Some(Session::new(principal))),
        Err(err) if err.status() == Some(401) => {
            warn!(error = %err, "api token rejected");
            Ok(None)
        }
        Err(err) => Err(err).context("failed to resolve the current session"),
    }
}

fn admit(
    entity: &str,
    operation: AccessOperation,
    session: Option<Session>,
    location: &str,
) -> Result<Admission> {
    AccessGate::for_entity(entity, operation)
        .admit(GateContext::new(session, NavigationContext::parse(location)))
        .map_err(|redirect| {
            anyhow!(
                "access denied ({:?}), redirected to {}",
                redirect.reason,
                redirect.to
            )
        })
}

async fn apply_book_fields(
    controller: &EntityFormController<BookForm>,
    api: Arc<dyn AdminApi>,
    fields: &BookFields,
) -> Result<()> {
    for (field, raw) in [
        ("title", &fields.title),
        ("author", &fields.author),
        ("publication_year", &fields.publication_year),
    ] {
        if let Some(raw) = raw {
            controller.set_field(field, raw).await?;
        }
    }
    if let Some(organization_id) = &fields.organization_id {
        organization_selector(api)
            .select(controller, organization_id)
            .await
            .context("could not select organization")?;
    }
    Ok(())
}

async fn submit<F>(controller: &EntityFormController<F>) -> Result<()>
where
    F: EntityForm,
    F::Record: Serialize,
{
    info!(form = %controller.title(), "submitting");
    report(controller.submit().await)
}

fn report<R: Serialize>(outcome: SubmitOutcome<R>) -> Result<()> {
    match outcome {
        SubmitOutcome::Saved(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        SubmitOutcome::Invalid(errors) => {
            for (field, message) in errors.iter() {
                eprintln!("{field}: {message}");
            }
            bail!("form has {} invalid field(s)", errors.len())
        }
        SubmitOutcome::Failed(error) => bail!(error.display_message()),
        SubmitOutcome::Ignored | SubmitOutcome::Cancelled => bail!("submission did not run"),
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
