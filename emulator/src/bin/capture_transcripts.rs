use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Single)?;
    record_profile(TranscriptProfile::Dual)?;
    record_profile(TranscriptProfile::Mixed)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    session.boot()?;
    match profile {
        TranscriptProfile::Single => record_single(&mut session),
        TranscriptProfile::Dual => record_dual(&mut session),
        TranscriptProfile::Mixed => record_mixed(&mut session),
    }
}

fn run(session: &mut Session, lines: &[&str]) -> io::Result<()> {
    for line in lines {
        session.handle_command(line)?;
    }
    Ok(())
}

fn record_single(session: &mut Session) -> io::Result<()> {
    run(
        session,
        &[
            "help",
            "status",
            "tick 20",
            "rpm 1",
            "param set RPM1_SCALING=2",
            "rpm 1",
            "sim 1 off",
            "tick 1100",
            "rpm 1",
            "status",
            "sim 1 1800",
            "tick 10",
            "rpm",
        ],
    )
}

fn record_dual(session: &mut Session) -> io::Result<()> {
    run(
        session,
        &[
            "tick 50",
            "rpm",
            "param set RPM_MIN_QUAL=0.6",
            "rpm 1",
            "param set RPM2_TYPE=0",
            "detect",
            "status",
            "param set RPM2_TYPE=7",
            "detect",
            "rpm 2",
        ],
    )
}

fn record_mixed(session: &mut Session) -> io::Result<()> {
    run(
        session,
        &[
            "tick 20",
            "rpm",
            "tick 500",
            "rpm 1",
            "param set RPM_MAX=5000",
            "rpm",
            "param show RPM_MAX",
            "param set RPM1_PIN=-1",
            "status",
            "param set RPM_BOGUS=1",
        ],
    )
}
