use clap::{Arg, Command};

pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_BACKEND_ANON_KEY: &str = "backend-anon-key";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND_URL)
                .long(ARG_BACKEND_URL)
                .help("Base URL of the hosted auth and database service, example: https://project.supabase.co")
                .env("PORTAL_BACKEND_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_BACKEND_ANON_KEY)
                .long(ARG_BACKEND_ANON_KEY)
                .help("Public anon key sent with every service request")
                .env("PORTAL_BACKEND_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
}
