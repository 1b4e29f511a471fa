mod session;

use std::env;
use std::io;
use std::process;

use session::{Session, TranscriptProfile};

const USAGE: &str = "Usage: rpm-emulator [--profile <single|dual|mixed>] | rpm-emulator <single|dual|mixed>";

fn main() -> io::Result<()> {
    let profile = profile_from_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut session = Session::new(profile)?;
    session.serve(io::stdin().lock(), io::stdout().lock())
}

fn profile_from_args(mut args: impl Iterator<Item = String>) -> Result<TranscriptProfile, String> {
    let tag = match args.next() {
        None => return Ok(TranscriptProfile::Single),
        Some(flag) if flag == "--profile" => args
            .next()
            .ok_or_else(|| "Expected value after --profile".to_string())?,
        Some(arg) => match arg.strip_prefix("--profile=") {
            Some(value) => value.to_string(),
            None => arg,
        },
    };

    if let Some(extra) = args.next() {
        return Err(format!("Unexpected argument `{extra}`"));
    }
    TranscriptProfile::from_tag(&tag)
}
