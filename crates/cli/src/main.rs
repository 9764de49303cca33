use clap::{Args, Parser, Subcommand};
use prm_core::custom_fields::coerce_input;
use prm_core::views::{self, PageRequest};
use prm_core::{
    Address, AppServices, CallScope, CancelToken, ConfigValues, CoreConfig, Credentials,
    CustomFieldDefinition, CustomFieldInput, PatientDraft, RecordError, RecordResult,
    SessionContext,
};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;

#[derive(Parser)]
#[command(name = "prm")]
#[command(about = "Patient records manager CLI")]
struct Cli {
    /// Account email
    #[arg(long, env = "PRM_EMAIL", global = true)]
    email: Option<String>,
    /// Account password
    #[arg(long, env = "PRM_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        /// Must match --password
        #[arg(long)]
        confirm_password: String,
    },
    /// Patient records
    #[command(subcommand)]
    Patients(PatientCommands),
    /// Custom field definitions
    #[command(subcommand)]
    Fields(FieldCommands),
}

#[derive(Subcommand)]
enum PatientCommands {
    /// List patients, one page at a time
    List {
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Rows per page (10, 25, 50 or 100)
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Show one patient
    Show { id: String },
    /// Add a patient
    Add(PatientArgs),
    /// Edit a patient; options not given keep their stored value
    Edit {
        id: String,
        #[command(flatten)]
        changes: PatientArgs,
        /// Remove the middle name
        #[arg(long, conflicts_with = "middle_name")]
        clear_middle_name: bool,
    },
    /// Delete a patient
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Args, Default)]
struct PatientArgs {
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    middle_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    dob: Option<String>,
    /// Inquiry, Onboarding, Active or Churned
    #[arg(long)]
    status: Option<String>,
    /// `LINE1|CITY|STATE|ZIP` or `LINE1|LINE2|CITY|STATE|ZIP`; repeat for more.
    /// On edit, replaces every stored address.
    #[arg(long = "address", value_parser = parse_address)]
    addresses: Vec<Address>,
    /// `FIELD=VALUE`, where FIELD is a custom field id or label; repeat for more
    #[arg(long = "field", value_parser = parse_assignment)]
    fields: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum FieldCommands {
    /// List custom field definitions
    List,
    /// Define a custom field
    Add {
        label: String,
        /// string, number, date or boolean
        field_type: String,
        #[arg(long)]
        required: bool,
    },
    /// Change a custom field definition
    Update {
        id: String,
        label: String,
        /// string, number, date or boolean
        field_type: String,
        #[arg(long)]
        required: bool,
    },
    /// Delete a custom field definition; stored patient values are kept
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

fn parse_address(raw: &str) -> Result<Address, String> {
    let parts: Vec<&str> = raw.split('|').map(str::trim).collect();
    let (line1, line2, city, state, zip) = match parts.as_slice() {
        [line1, city, state, zip] => (*line1, None, *city, *state, *zip),
        [line1, line2, city, state, zip] => (*line1, Some(*line2), *city, *state, *zip),
        _ => {
            return Err("expected LINE1|CITY|STATE|ZIP or LINE1|LINE2|CITY|STATE|ZIP".into());
        }
    };
    Ok(Address {
        id: None,
        address_line1: line1.to_string(),
        address_line2: line2.filter(|l| !l.is_empty()).map(str::to_string),
        city: city.to_string(),
        state: state.to_string(),
        zip: zip.to_string(),
    })
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err("expected FIELD=VALUE".into()),
    }
}

/// Finds a definition by id, or by label ignoring case.
fn find_field<'a>(
    defs: &'a [CustomFieldDefinition],
    key: &str,
) -> RecordResult<&'a CustomFieldDefinition> {
    defs.iter()
        .find(|d| d.id == key)
        .or_else(|| defs.iter().find(|d| d.label.eq_ignore_ascii_case(key)))
        .ok_or_else(|| RecordError::InvalidInput(format!("Unknown custom field '{key}'.")))
}

impl PatientArgs {
    /// Applies every given option on top of `draft`.
    fn apply(self, draft: &mut PatientDraft, defs: &[CustomFieldDefinition]) -> RecordResult<()> {
        if let Some(v) = self.first_name {
            draft.first_name = v;
        }
        if let Some(v) = self.middle_name {
            draft.middle_name = Some(v);
        }
        if let Some(v) = self.last_name {
            draft.last_name = v;
        }
        if let Some(v) = self.dob {
            draft.dob = v;
        }
        if let Some(v) = self.status {
            draft.status = v;
        }
        if !self.addresses.is_empty() {
            draft.addresses = self.addresses;
        }
        for (key, raw) in self.fields {
            let def = find_field(defs, &key)?;
            draft
                .custom_field_values
                .insert(def.id.clone(), coerce_input(def.field_type, &raw));
        }
        Ok(())
    }
}

/// Asks a yes/no question on the terminal. Anything but `y`/`yes` is a no.
async fn confirm(prompt: String) -> bool {
    tokio::task::spawn_blocking(move || {
        use std::io::Write;
        print!("{prompt} [y/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer).is_ok()
            && matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    })
    .await
    .unwrap_or(false)
}

/// Cancels `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling the in-flight request");
            token.cancel();
        }
    });
}

fn credentials(cli: &Cli) -> RecordResult<Credentials> {
    let (Some(email), Some(password)) = (cli.email.as_deref(), cli.password.clone()) else {
        return Err(RecordError::InvalidInput(
            "Credentials required: pass --email and --password or set PRM_EMAIL and PRM_PASSWORD."
                .into(),
        ));
    };
    Ok(Credentials::new(email, password)?)
}

async fn run(cli: Cli, services: AppServices) -> RecordResult<()> {
    let session = SessionContext::start(services.auth.clone());
    let credentials = credentials(&cli)?;

    let result = match cli.command {
        Commands::Register { confirm_password } => {
            session.register(&credentials, &confirm_password).await?;
            println!("{}", views::Notice::registered().message);
            Ok(())
        }
        Commands::Patients(command) => {
            session.login(&credentials).await?;
            let cancel = CancelToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let scope = session.call_scope()?.with_cancel(cancel);
            patients(&services, &scope, command).await
        }
        Commands::Fields(command) => {
            session.login(&credentials).await?;
            let cancel = CancelToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let scope = session.call_scope()?.with_cancel(cancel);
            fields(&services, &scope, command).await
        }
    };

    session.shutdown();
    result
}

async fn patients(
    services: &AppServices,
    scope: &CallScope,
    command: PatientCommands,
) -> RecordResult<()> {
    match command {
        PatientCommands::List { page, page_size } => {
            let request = PageRequest::new(
                page.saturating_sub(1),
                page_size.unwrap_or(services.config.default_page_size()),
            )?;
            let defs = services.registry.list_sorted(scope).await?;
            let patients = services.patients.list(scope).await?;
            println!(
                "{}",
                render::patient_table(&views::patient_table(&patients, &defs, request))
            );
        }
        PatientCommands::Show { id } => {
            let defs = services.registry.list_sorted(scope).await?;
            let patient = services.patients.get(scope, &id).await?;
            println!("{}", render::patient_detail(&views::patient_detail(&patient, &defs)));
        }
        PatientCommands::Add(args) => {
            let defs = services.registry.list(scope).await?;
            let mut draft = PatientDraft::default();
            args.apply(&mut draft, &defs)?;
            let patient = services.patients.create(scope, draft).await?;
            println!("{} ({})", views::Notice::patient_added().message, patient.id);
        }
        PatientCommands::Edit {
            id,
            changes,
            clear_middle_name,
        } => {
            let form = services.patients.load_for_edit(scope, &id).await?;
            let mut draft = form.draft;
            changes.apply(&mut draft, &form.fields)?;
            if clear_middle_name {
                draft.middle_name = None;
            }
            services.patients.update(scope, &id, draft).await?;
            println!("{}", views::Notice::patient_updated().message);
        }
        PatientCommands::Delete { id, yes } => {
            let pending = services.patients.request_delete(scope, &id).await?;
            if !yes && !confirm(pending.prompt.clone()).await {
                println!("Cancelled.");
                return Ok(());
            }
            pending.confirm(scope).await?;
            println!("{}", views::Notice::patient_deleted().message);
        }
    }
    Ok(())
}

async fn fields(
    services: &AppServices,
    scope: &CallScope,
    command: FieldCommands,
) -> RecordResult<()> {
    match command {
        FieldCommands::List => {
            let defs = services.registry.list_sorted(scope).await?;
            println!("{}", render::field_table(&views::custom_field_table(&defs)));
        }
        FieldCommands::Add {
            label,
            field_type,
            required,
        } => {
            let def = services
                .registry
                .create(scope, &CustomFieldInput::new(label, field_type, required))
                .await?;
            println!("{} ({})", views::Notice::field_saved().message, def.id);
        }
        FieldCommands::Update {
            id,
            label,
            field_type,
            required,
        } => {
            services
                .registry
                .update(scope, &id, &CustomFieldInput::new(label, field_type, required))
                .await?;
            println!("{}", views::Notice::field_saved().message);
        }
        FieldCommands::Delete { id, yes } => {
            // Surfaces NotFound before asking.
            services.registry.get(scope, &id).await?;
            let confirmed =
                yes || confirm(prm_core::custom_fields::DELETE_FIELD_PROMPT.to_string()).await;
            if !confirmed {
                println!("Cancelled.");
                return Ok(());
            }
            services.registry.delete_confirmed(scope, &id, true).await?;
            println!("{}", views::Notice::field_deleted().message);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("prm=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let outcome = match CoreConfig::from_values(ConfigValues::from_env())
        .and_then(AppServices::build)
    {
        Ok(services) => run(cli, services).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::debug!("command failed: {}", e);
            eprintln!("{}", render::error(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}
