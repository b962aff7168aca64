use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("oidc-session")
        .about("OIDC session watcher: silent SSO detection and background token renewal")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .help("Identity provider base URL, example: https://sso.example.com")
                .env("OIDC_SESSION_URL")
                .required(true),
        )
        .arg(
            Arg::new("realm")
                .short('r')
                .long("realm")
                .help("Realm (tenant) name")
                .env("OIDC_SESSION_REALM")
                .required(true),
        )
        .arg(
            Arg::new("client-id")
                .short('c')
                .long("client-id")
                .help("Client ID registered in the realm")
                .env("OIDC_SESSION_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new("refresh-token")
                .long("refresh-token")
                .help("Refresh token from an earlier session, used for silent sign-on")
                .env("OIDC_SESSION_REFRESH_TOKEN"),
        )
        .arg(
            Arg::new("redirect-uri")
                .long("redirect-uri")
                .help("Where interactive login/logout flows return to")
                .env("OIDC_SESSION_REDIRECT_URI"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("OIDC_SESSION_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
