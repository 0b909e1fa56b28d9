//! A simple CLI tool for verifying finalized RT elections offline.
//! This uses the server's own verification logic, and is by definition
//! compatible with the record dumps served by our API.

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use rtvote_backend::{
    anchor::{Anchor, AnchorError, HttpAnchor},
    model::api::election::ElectionRecord,
    protocol::{hasher::TallySummary, verify::{assess, Verification}},
};

const PROGRAM_NAME: &str = "verify-rtvote";

const ABOUT_TEXT: &str = "Verify the integrity of a finalized RT election.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const RECORD_PATH: &str = "RECORD_PATH";

const RECORD_PATH_HELP: &str = "The path to a JSON dump of an election record,\n\
as returned by `GET /elections/<election_id>/record`";

const ANCHOR: &str = "anchor";

const ANCHOR_HELP: &str = "Base URL of the anchor service; if given, the stored\n\
fingerprint is also checked against the anchored one";

const ANCHOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(RECORD_PATH)
                .help(RECORD_PATH_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(ANCHOR)
                .long(ANCHOR)
                .value_name("URL")
                .help(ANCHOR_HELP)
                .action(ArgAction::Set),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// Could not ask the anchor.
    Anchor(String),
}

/// Ask the anchor for its fingerprint. An anchor with no record yields an
/// empty fingerprint, which fails verification rather than erroring.
fn anchored_fingerprint(url: &str, election_id: &str) -> Result<String, Error> {
    let runtime = rocket::tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::IO(e.to_string()))?;
    runtime.block_on(async {
        let anchor =
            HttpAnchor::new(url, None, ANCHOR_TIMEOUT).map_err(|e| Error::Anchor(e.to_string()))?;
        match anchor.fetch(election_id).await {
            Ok(fingerprint) => Ok(fingerprint),
            Err(AnchorError::NoRecord(_)) => Ok(String::new()),
            Err(e) => Err(Error::Anchor(e.to_string())),
        }
    })
}

/// Run verification.
fn verify(path: &str, anchor_url: Option<&str>) -> Result<Verification, Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let record: ElectionRecord =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;

    let anchor_fingerprint = anchor_url
        .map(|url| anchored_fingerprint(url, &record.election_id))
        .transpose()?;

    Ok(assess(
        &record.election_id,
        record.summary.as_deref(),
        record.summary_fingerprint.as_deref(),
        anchor_fingerprint.as_deref(),
        record.anchor_reference.as_deref(),
    ))
}

/// Print the sealed tally, if it can be read.
fn print_results(summary: &str) {
    let Ok(summary) = TallySummary::parse(summary) else {
        return;
    };
    println!(
        "{} revealed vote{}, sealed at {}",
        summary.total_revealed,
        if summary.total_revealed != 1 { "s" } else { "" },
        summary.timestamp
    );
    for line in &summary.results {
        println!(
            "{}: {} vote{}",
            line.candidate_id,
            line.total,
            if line.total != 1 { "s" } else { "" }
        );
    }
    if !summary.winner.is_empty() {
        println!("Winner: {}", summary.winner);
    }
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(RECORD_PATH).unwrap(); // Required argument is guaranteed to be present.
    let anchor_url = args.get_one::<String>(ANCHOR).map(String::as_str);
    match verify(path, anchor_url) {
        Ok(verification) if verification.valid => {
            println!("Verification succeeded: {}.", verification.message);
            println!("Fingerprint: {}", verification.stored_fingerprint);
            if !verification.anchor_reference.is_empty() {
                println!("Anchor reference: {}", verification.anchor_reference);
            }
            if let Ok(file) = File::open(path) {
                if let Ok(ElectionRecord {
                    summary: Some(summary),
                    ..
                }) = serde_json::from_reader(BufReader::new(file))
                {
                    print_results(&summary);
                }
            }
            0
        }
        Ok(verification) => {
            println!("Verification failed: {}.", verification.message);
            println!("Recomputed fingerprint: {}", verification.local_fingerprint);
            println!("Stored fingerprint:     {}", verification.stored_fingerprint);
            if anchor_url.is_some() {
                println!("Anchored fingerprint:   {}", verification.anchor_fingerprint);
            }
            255
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {}", msg);
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {}", msg);
            1
        }
        Err(Error::Anchor(msg)) => {
            println!("Anchor error: {}", msg);
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification() {
        // This test actually enters backend code, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["rtvote_backend"], None, None);

        let v = verify("example_dumps/election.json", None).unwrap();
        assert!(v.valid);
        assert_eq!(
            v.local_fingerprint,
            "0x528830e7ac9ae563a95bfdd01a0f72658ad1175efefa65122e0922e1c85ea58d"
        );
        assert_eq!(v.anchor_reference, "0xtx00016d2f9a41");

        // Whitespace is not part of the sealed form.
        assert!(verify("example_dumps/election_reformatted.json", None).unwrap().valid);

        let v = verify("example_dumps/election_tampered.json", None).unwrap();
        assert!(!v.valid);
        assert_ne!(v.local_fingerprint, v.stored_fingerprint);

        let v = verify("example_dumps/election_unfinalized.json", None).unwrap();
        assert!(!v.valid);
        assert_eq!(v.message, "election has not been finalized");

        assert!(matches!(
            verify("example_dumps/election_malformed.json", None),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            verify("not a real file", None),
            Err(Error::IO(_))
        ));
    }

    #[test]
    fn correct_cli_usage() {
        let command_line = [PROGRAM_NAME, "example_dumps/election.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 0);

        let command_line = [PROGRAM_NAME, "example_dumps/election_tampered.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 255);

        let command_line = [PROGRAM_NAME, "example_dumps/election_unfinalized.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 255);

        let command_line = [PROGRAM_NAME, "example_dumps/election_malformed.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        let command_line = [PROGRAM_NAME, "not a real file"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);
    }

    #[test]
    fn unreachable_anchor_is_an_error() {
        // Port 9 (discard) is essentially never listening on loopback.
        let command_line = [
            PROGRAM_NAME,
            "example_dumps/election.json",
            "--anchor",
            "http://127.0.0.1:9",
        ];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        let command_line = [
            PROGRAM_NAME,
            "example_dumps/election.json",
            "--anchor",
            "not a url",
        ];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);
    }

    #[test]
    fn bad_cli_usage() {
        // Something very wrong.
        let command_line = [PROGRAM_NAME, "this", "invocation", "is", "incorrect"];
        cli().try_get_matches_from(command_line).unwrap_err();

        // No options at all.
        let command_line = [PROGRAM_NAME];
        cli().try_get_matches_from(command_line).unwrap_err();

        // Anchor without a URL.
        let command_line = [PROGRAM_NAME, "example_dumps/election.json", "--anchor"];
        cli().try_get_matches_from(command_line).unwrap_err();
    }
}
