use clap::{Parser, Subcommand};

/// Culture & Moi: team culture surveys and their dashboards.
///
/// Without a subcommand, reads a table of survey responses and writes the dashboard summary.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Option<Command>,

    /// (file path, optional) The JSON configuration of the dashboard: data source, themes and organisation.
    /// Paths in this file are relative to its directory.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference dashboard summary in JSON format. If provided, cultmoi will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the dashboard summary will be written in JSON format to the given
    /// location. Setting this option overrides the output directory that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) The table of responses. Setting this option overrides the data source of the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv, xlsx or xls) The type of the input. By default, it is given by the file extension.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (list of comma-separated values or not specified) The themes to chart. All the themes by default.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub theme: Option<Vec<String>>,

    /// (list of comma-separated values or not specified) The respondents shown in the chart per respondent.
    /// 'All' shows everybody, which is the default.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub users: Option<Vec<String>>,

    /// (median or id, default median) The order of the respondents in the chart per respondent.
    #[clap(long, value_parser)]
    pub order: Option<String>,

    /// When using an Excel file, indicates the name of the worksheet to use. The first worksheet by default.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Builds a survey from authoring forms (JSON list) and exports it.
    Author {
        /// (file path) The submitted forms: a JSON list of {theme, type, text, choices}.
        #[clap(short, long, value_parser)]
        forms: String,
        /// (directory) Where the export is written. The current directory by default.
        #[clap(short, long, value_parser)]
        out_dir: Option<String>,
    },
    /// Lists the survey exports of a directory.
    Surveys {
        /// (directory) The current directory by default.
        #[clap(value_parser)]
        dir: Option<String>,
    },
    /// Fills a survey with the answers of a respondent and prints the response.
    Respond {
        /// (file path, optional) A survey export (.bin.gz) or definition (.json). The default survey otherwise.
        #[clap(short, long, value_parser)]
        survey: Option<String>,
        /// (file path) The answers: a JSON object from question texts to values.
        #[clap(short, long, value_parser)]
        answers: String,
        /// The respondent.
        #[clap(short, long, value_parser)]
        user: String,
        /// (file path or 'stdout', default stdout) Where the response is written.
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
    /// Manages the accounts of the credentials file.
    Account {
        /// (file path) The credentials file. Setting this option overrides the one of the --config option.
        #[clap(long, value_parser)]
        credentials: Option<String>,
        /// (file path, optional) The configuration holding the credentials path and the administrators.
        #[clap(short, long, value_parser)]
        config: Option<String>,
        #[clap(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AccountAction {
    /// Creates an account.
    Register {
        #[clap(long, value_parser)]
        username: String,
        #[clap(long, value_parser)]
        name: String,
        #[clap(long, value_parser)]
        email: String,
        #[clap(long, value_parser)]
        password: String,
        #[clap(long, value_parser)]
        repeat_password: String,
        /// Only accept e-mails of the pre-authorized list.
        #[clap(long, takes_value = false)]
        preauthorization: bool,
    },
    /// Checks the credentials and prints the session.
    Login {
        #[clap(long, value_parser)]
        username: String,
        #[clap(long, value_parser)]
        password: String,
    },
    /// Changes the password of an account.
    ResetPassword {
        #[clap(long, value_parser)]
        username: String,
        #[clap(long, value_parser)]
        password: String,
        #[clap(long, value_parser)]
        new_password: String,
        #[clap(long, value_parser)]
        repeat_password: String,
    },
    /// Changes the name or the e-mail of an account.
    Update {
        #[clap(long, value_parser)]
        username: String,
        #[clap(long, value_parser)]
        password: String,
        #[clap(long, value_parser)]
        name: Option<String>,
        #[clap(long, value_parser)]
        email: Option<String>,
    },
}
