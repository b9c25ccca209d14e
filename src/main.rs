use clap::Parser;
use log::{debug, LevelFilter};

mod args;
mod cm;

use crate::args::{Args, Command};
use crate::cm::{CmResult, DashboardOptions};

fn run(args: &Args) -> CmResult<()> {
    match &args.command {
        None => {
            let opts = DashboardOptions {
                config_path: args.config.clone(),
                input: args.input.clone(),
                input_type: args.input_type.clone(),
                excel_worksheet_name: args.excel_worksheet_name.clone(),
                themes: args.theme.clone(),
                users: args.users.clone(),
                order: args.order.clone(),
                out: args.out.clone(),
                reference: args.reference.clone(),
            };
            cm::run_dashboard(&opts)?;
        }
        Some(Command::Author { forms, out_dir }) => {
            cm::run_author(forms, out_dir.as_deref())?;
        }
        Some(Command::Surveys { dir }) => {
            cm::run_list_surveys(dir.as_deref())?;
        }
        Some(Command::Respond {
            survey,
            answers,
            user,
            out,
        }) => {
            cm::run_respond(survey.as_deref(), answers, user, out.as_deref())?;
        }
        Some(Command::Account {
            credentials,
            config,
            action,
        }) => {
            cm::run_account(credentials.as_deref(), config.as_deref(), action)?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    debug!("args: {:?}", args);

    if let Err(e) = run(&args) {
        cm::report_error(&e);
        std::process::exit(1);
    }
}
