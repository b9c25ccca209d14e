use log::{debug, info, warn};

use snafu::{prelude::*, ErrorCompat, Snafu};
use survey_scores::*;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::AccountAction;
use crate::cm::config_reader::*;
use crate::cm::identity::{IdentityError, IdentityStore, Registration, UserField, DEFAULT_ADMINS};
use crate::cm::io_common::*;
use crate::cm::survey_flow::{
    export_survey, list_surveys, load_survey, make_default_survey, Answer, QuestionForm,
    SurveyDefinition, SurveyError, SurveySession,
};

pub mod config_reader;
pub mod identity;
mod io_common;
mod io_csv;
mod io_excel;
pub mod survey_flow;
mod write_lock;

#[derive(Debug, Snafu)]
pub enum CmError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningXls {
        source: calamine::XlsError,
        path: String,
    },
    #[snafu(display("The workbook has no such worksheet"))]
    EmptyExcel {},
    #[snafu(display("Error opening file {path}"))]
    OpeningCsv { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of the CSV file"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno} of the CSV file has {found} cells, but the header has {expected} columns"))]
    CsvRowTooLong {
        lineno: usize,
        expected: usize,
        found: usize,
    },
    #[snafu(display("Unsupported input format {format:?}: expected csv, xlsx or xls"))]
    UnsupportedFormat { format: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Expected a column index"))]
    ParsingJsonNumber {},
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Could not compute the dashboard: {source}"))]
    Scoring { source: ScoreErrors },
    #[snafu(display("{source}"))]
    Identity { source: IdentityError },
    #[snafu(display("{source}"))]
    Survey { source: SurveyError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CmResult<T> = Result<T, CmError>;

/// What the dashboard command reads and where it writes.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DashboardOptions {
    pub config_path: Option<String>,
    pub input: Option<String>,
    pub input_type: Option<String>,
    pub excel_worksheet_name: Option<String>,
    pub themes: Option<Vec<String>>,
    pub users: Option<Vec<String>>,
    pub order: Option<String>,
    pub out: Option<String>,
    pub reference: Option<String>,
}

fn read_response_table(
    path: &str,
    format: InputFormat,
    worksheet_name: Option<&str>,
) -> CmResult<ResponseTable> {
    info!("Attempting to read responses {:?} ({:?})", path, format);
    match format {
        InputFormat::Csv => io_csv::read_csv_table(path),
        InputFormat::Xlsx | InputFormat::Xls => {
            io_excel::read_excel_table(path, format, worksheet_name)
        }
    }
}

fn parse_order(order: Option<&str>) -> CmResult<RespondentOrder> {
    match order {
        None | Some("median") => Ok(RespondentOrder::MedianScore),
        Some("id") => Ok(RespondentOrder::Identifier),
        Some(x) => whatever!("Unknown respondent order {:?}: expected median or id", x),
    }
}

fn build_summary_js(title: &str, summary: &DashboardSummary) -> CmResult<JSValue> {
    let dashboard = serde_json::to_value(summary).context(ParsingJsonSnafu {})?;
    Ok(json!({
        "config": { "title": title },
        "dashboard": dashboard
    }))
}

/// Reads the responses, computes all the charts and writes the summary.
///
/// Returns the summary document.
pub fn run_dashboard(opts: &DashboardOptions) -> CmResult<JSValue> {
    let config: Option<CmConfig> = match &opts.config_path {
        Some(p) => Some(read_config(p)?),
        None => None,
    };
    debug!("run_dashboard: config: {:?}", config);

    let data_source = config.as_ref().and_then(|c| c.data_source.clone());
    let input_path: String = match (&opts.input, &data_source, &opts.config_path) {
        (Some(p), _, _) => p.clone(),
        (None, Some(ds), Some(config_path)) => resolve_path(config_path, &ds.file_path)?,
        _ => whatever!("No input provided: use --input or a configuration with a data source"),
    };
    let declared_format = opts
        .input_type
        .clone()
        .or_else(|| data_source.as_ref().and_then(|ds| ds.format.clone()));
    let format = input_format(&input_path, declared_format.as_deref())?;
    let worksheet = opts
        .excel_worksheet_name
        .clone()
        .or_else(|| {
            data_source
                .as_ref()
                .and_then(|ds| ds.excel_worksheet_name.clone())
        });

    let rules = match &config {
        Some(c) => c.score_rules()?,
        None => ScoreRules::with_default_organization(),
    };
    let title = config
        .as_ref()
        .map(|c| c.output_settings.title.clone())
        .unwrap_or_else(|| simplify_file_name(&input_path));

    let table = read_response_table(&input_path, format, worksheet.as_deref())?;

    let selection = match &opts.users {
        Some(labels) => RespondentSelection::from_labels(labels),
        None => RespondentSelection::All,
    };
    let order = parse_order(opts.order.as_deref())?;

    let summary = run_dashboard_stats(table, &rules, opts.themes.as_deref(), &selection, order)
        .context(ScoringSnafu {})?;
    info!(
        "Dashboard: {} respondents, {} numeric questions",
        summary.respondents.len(),
        summary.numeric_questions.len()
    );

    let result_js = build_summary_js(&title, &summary)?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;

    let out_path: Option<String> = match (&opts.out, &config, &opts.config_path) {
        (Some(o), _, _) => Some(o.clone()),
        (None, Some(c), Some(config_path)) => match &c.output_settings.output_directory {
            Some(dir) => {
                let dir = resolve_path(config_path, dir)?;
                let p: PathBuf = [dir, "dashboard_summary.json".to_string()].iter().collect();
                Some(p.display().to_string())
            }
            None => None,
        },
        _ => None,
    };
    write_output(out_path.as_deref(), &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &opts.reference {
        let summary_ref = read_summary(summary_p.clone())?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between computed summary and reference summary")
        }
    }

    Ok(result_js)
}

fn write_output(out: Option<&str>, contents: &str) -> CmResult<()> {
    match out {
        None | Some("stdout") => {
            println!("{}", contents);
        }
        Some(path) => {
            fs::write(path, contents).context(WritingOutputSnafu { path })?;
            info!("Output written to {}", path);
        }
    }
    Ok(())
}

/// Applies the authoring forms one after the other and exports the draft.
pub fn run_author(forms_path: &str, out_dir: Option<&str>) -> CmResult<PathBuf> {
    let contents = fs::read_to_string(forms_path).context(OpeningJsonSnafu { path: forms_path })?;
    let forms: Vec<QuestionForm> = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    let mut definition = SurveyDefinition::new();
    for form in forms {
        definition.add_question(form).context(SurveySnafu {})?;
    }
    println!("{}", definition.describe());
    if definition.is_empty() {
        whatever!("No question to export");
    }
    let dir = Path::new(out_dir.unwrap_or("."));
    let path = export_survey(&definition, dir, &Local::now().naive_local()).context(SurveySnafu {})?;
    info!("Saved at {}", path.display());
    Ok(path)
}

pub fn run_list_surveys(dir: Option<&str>) -> CmResult<Vec<PathBuf>> {
    let paths = list_surveys(Path::new(dir.unwrap_or("."))).context(SurveySnafu {})?;
    for p in paths.iter() {
        println!("{}", p.display());
    }
    Ok(paths)
}

fn read_survey(path: Option<&str>) -> CmResult<SurveyDefinition> {
    match path {
        None => Ok(make_default_survey()),
        Some(p) if p.to_ascii_lowercase().ends_with(".json") => {
            SurveyDefinition::from_json_file(Path::new(p)).context(SurveySnafu {})
        }
        Some(p) => load_survey(Path::new(p)).context(SurveySnafu {}),
    }
}

/// Goes through the pages of the survey with the given answers and submits it.
pub fn run_respond(
    survey_path: Option<&str>,
    answers_path: &str,
    user: &str,
    out: Option<&str>,
) -> CmResult<JSValue> {
    let definition = read_survey(survey_path)?;
    let contents =
        fs::read_to_string(answers_path).context(OpeningJsonSnafu { path: answers_path })?;
    let mut answers: HashMap<String, Answer> =
        serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;

    let mut session = SurveySession::new(definition, user).context(SurveySnafu {})?;
    loop {
        let page = session.current_page();
        debug!("run_respond: page {}: {}", page.index, page.theme);
        let texts: Vec<String> = page.questions.iter().map(|q| q.text.clone()).collect();
        for text in texts {
            if let Some(answer) = answers.remove(&text) {
                session.answer(&text, answer).context(SurveySnafu {})?;
            }
        }
        if !session.next() {
            break;
        }
    }
    for text in answers.keys() {
        warn!("run_respond: no question {:?} in the survey", text);
    }

    let response = session
        .submit(Local::now().naive_local(), |r| {
            info!("Submitted! ({} answers from {})", r.answers.len(), r.user)
        })
        .context(SurveySnafu {})?;
    let js = response.to_json();
    let pretty = serde_json::to_string_pretty(&js).context(ParsingJsonSnafu {})?;
    write_output(out, &pretty)?;
    Ok(js)
}

fn open_identity_store(
    credentials: Option<&str>,
    config_path: Option<&str>,
) -> CmResult<IdentityStore> {
    let config: Option<CmConfig> = match config_path {
        Some(p) => Some(read_config(p)?),
        None => None,
    };
    let admins: Vec<String> = match &config {
        Some(c) => c.admins(),
        None => DEFAULT_ADMINS.iter().map(|s| s.to_string()).collect(),
    };
    let path: String = match (credentials, &config, config_path) {
        (Some(p), _, _) => p.to_string(),
        (None, Some(c), Some(config_p)) => match &c.credentials_path {
            Some(p) => resolve_path(config_p, p)?,
            None => whatever!("The configuration has no credentialsPath"),
        },
        _ => whatever!("No credentials file: use --credentials or a configuration"),
    };
    IdentityStore::open(Path::new(&path), &admins).context(IdentitySnafu {})
}

pub fn run_account(
    credentials: Option<&str>,
    config_path: Option<&str>,
    action: &AccountAction,
) -> CmResult<()> {
    let mut store = open_identity_store(credentials, config_path)?;
    let now = Utc::now();
    match action {
        AccountAction::Register {
            username,
            name,
            email,
            password,
            repeat_password,
            preauthorization,
        } => {
            let form = Registration {
                username: username.clone(),
                name: name.clone(),
                email: email.clone(),
                password: password.clone(),
                repeat_password: repeat_password.clone(),
            };
            store
                .register(&form, *preauthorization)
                .context(IdentitySnafu {})?;
            println!("User registered successfully");
        }
        AccountAction::Login { username, password } => {
            let session = store
                .login(username, password, &now)
                .context(IdentitySnafu {})?;
            if session.is_admin() {
                info!("{} can author surveys and see the dashboard", session.username);
            }
            let js = serde_json::to_string_pretty(&session).context(ParsingJsonSnafu {})?;
            println!("{}", js);
            store.logout(session).context(IdentitySnafu {})?;
        }
        AccountAction::ResetPassword {
            username,
            password,
            new_password,
            repeat_password,
        } => {
            let session = store
                .login(username, password, &now)
                .context(IdentitySnafu {})?;
            store
                .reset_password(&session, password, new_password, repeat_password, &now)
                .context(IdentitySnafu {})?;
            println!("Password modified successfully");
        }
        AccountAction::Update {
            username,
            password,
            name,
            email,
        } => {
            let session = store
                .login(username, password, &now)
                .context(IdentitySnafu {})?;
            if name.is_none() && email.is_none() {
                whatever!("Nothing to update: use --name or --email");
            }
            if let Some(n) = name {
                store
                    .update_user_details(&session, UserField::Name, n, &now)
                    .context(IdentitySnafu {})?;
            }
            if let Some(e) = email {
                store
                    .update_user_details(&session, UserField::Email, e, &now)
                    .context(IdentitySnafu {})?;
            }
            println!("Entries updated successfully");
        }
    }
    Ok(())
}

/// Prints an error with its backtrace, when one was captured.
pub fn report_error(e: &CmError) {
    warn!("Error occured {:?}", e);
    eprintln!("An error occured: {}", e);
    if let Some(bt) = ErrorCompat::backtrace(e) {
        eprintln!("trace: {}", bt);
    }
}
