use super::*;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("fitsession").chain(args.iter().copied())).unwrap()
}

#[test]
fn login_takes_email_and_password() {
    let cli = parse(&["login", "--email", "user@example.com", "--password", "hunter22"]);
    let Command::Login(args) = cli.command else {
        panic!("expected login");
    };
    assert_eq!(args.email, "user@example.com");
    assert_eq!(args.password.as_deref(), Some("hunter22"));
}

#[test]
fn login_requires_email() {
    assert!(Cli::try_parse_from(["fitsession", "login"]).is_err());
}

#[test]
fn reset_confirm_parses_link() {
    let cli = parse(&["reset", "confirm", "--link", "https://app.example/reset?token=abc", "--password", "newsecret1"]);
    let Command::Reset(ResetCommand { command: ResetSubcommand::Confirm { link, confirm, .. } }) = cli.command else {
        panic!("expected reset confirm");
    };
    assert_eq!(link, "https://app.example/reset?token=abc");
    assert_eq!(confirm, None);
}

#[test]
fn api_post_requires_data() {
    assert!(Cli::try_parse_from(["fitsession", "api", "post", "/entries"]).is_err());
    let cli = parse(&["api", "post", "/entries", "--data", "{\"reps\":5}"]);
    assert!(matches!(cli.command, Command::Api(ApiCommand { command: ApiSubcommand::Post { .. } })));
}

#[test]
fn workout_log_defaults_optional_fields() {
    let cli = parse(&["workout", "log", "--exercise", "3", "--weight", "100", "--reps", "5", "--sets", "3"]);
    let Command::Workout(WorkoutCommand { command: WorkoutSubcommand::Log { exercise, notes, date, .. } }) = cli.command
    else {
        panic!("expected workout log");
    };
    assert_eq!(exercise, 3);
    assert!(notes.is_empty());
    assert!(date.is_empty());
}

#[test]
fn flags_override_environment_config() {
    let cli = parse(&["--api-url", "http://127.0.0.1:9/api/v1", "--store-dir", "/tmp/fs-cli-test", "whoami"]);
    let config = load_config(&cli).unwrap();
    assert_eq!(config.api_url, "http://127.0.0.1:9/api/v1");
    assert_eq!(config.store_dir, std::path::PathBuf::from("/tmp/fs-cli-test"));
}

#[test]
fn unknown_backend_flag_is_config_error() {
    let cli = parse(&["--backend", "ldap", "whoami"]);
    let err = load_config(&cli).unwrap_err();
    assert!(matches!(err, CliError::Session(SessionError::Config(_))));
}

#[test]
fn explicit_secret_skips_stdin() {
    assert_eq!(resolve_secret(Some("pw".to_owned())).unwrap(), "pw");
}
