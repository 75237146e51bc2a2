// Command-line surface and the validation clap's static constraints
// cannot express on their own: help-exclusivity, at-most-one-occurrence
// on -s/-i/--stats, at-least-one-of -s/-i, and the --stats-gating of
// the report flags. `ArgMatches::indices_of` recovers the original
// appearance order of the report flags so the stats file is written
// in the order the user asked for them, mirroring what the source
// got by re-scanning raw argv.

use crate::error::Error;
use crate::stats::StatsToken;
use clap::{Arg, ArgAction, Command};

#[derive(Debug)]
pub struct RunConfig {
    pub source: Option<String>,
    pub input: Option<String>,
    pub stats_path: Option<String>,
    pub stats_schedule: Vec<StatsToken>,
}

fn build_command() -> Command {
    Command::new("ippcode23-vm")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(Arg::new("help").short('h').long("help").action(ArgAction::SetTrue))
        .arg(Arg::new("source").short('s').long("source").action(ArgAction::Append))
        .arg(Arg::new("input").short('i').long("input").action(ArgAction::Append))
        .arg(Arg::new("stats").long("stats").action(ArgAction::Append))
        .arg(Arg::new("insts").long("insts").action(ArgAction::SetTrue))
        .arg(Arg::new("hot").long("hot").action(ArgAction::SetTrue))
        .arg(Arg::new("vars").long("vars").action(ArgAction::SetTrue))
        .arg(Arg::new("frequent").long("frequent").action(ArgAction::SetTrue))
        .arg(Arg::new("print").long("print").action(ArgAction::Append))
        .arg(Arg::new("eol").long("eol").action(ArgAction::SetTrue))
}

pub const HELP_TEXT: &str = "\
ippcode23-vm - interpreter for IPPcode23 XML programs

USAGE:
    ippcode23-vm [--source PATH] [--input PATH] [--stats PATH [flags...]]

OPTIONS:
    -h, --help            Print this help and exit
    -s, --source PATH     Source XML program (default: stdin)
    -i, --input PATH      Program input stream (default: stdin)
        --stats PATH      Write an execution report to PATH
        --insts           (requires --stats) executed instruction count
        --hot             (requires --stats) most-revisited instruction order
        --vars            (requires --stats) peak live-variable count
        --frequent        (requires --stats) most frequent opcode(s)
        --print STRING    (requires --stats) emit a literal token (repeatable)
        --eol             (requires --stats) emit a newline
";

/// Parse argv into a validated RunConfig, or print help and signal a
/// clean exit via `Ok(None)`.
pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<RunConfig>, Error> {
    let matches = build_command()
        .try_get_matches_from(args)
        .map_err(|e| Error::Cli(e.to_string()))?;

    if matches.get_flag("help") {
        let other_flags = ["source", "input", "stats", "insts", "hot", "vars", "frequent", "eol"];
        let any_other = other_flags.iter().any(|f| matches.contains_id(f) && matches.value_source(f).is_some())
            || matches.get_many::<String>("print").is_some();
        if any_other {
            return Err(Error::Cli("--help cannot be combined with other flags".into()));
        }
        print!("{}", HELP_TEXT);
        return Ok(None);
    }

    let source = single_valued(&matches, "source")?;
    let input = single_valued(&matches, "input")?;
    let stats_path = single_valued(&matches, "stats")?;

    if source.is_none() && input.is_none() {
        return Err(Error::Cli("at least one of --source/--input must be given".into()));
    }

    let report_flags_given = matches.get_flag("insts")
        || matches.get_flag("hot")
        || matches.get_flag("vars")
        || matches.get_flag("frequent")
        || matches.get_flag("eol")
        || matches.get_many::<String>("print").is_some();
    if report_flags_given && stats_path.is_none() {
        return Err(Error::Cli("stats flags require --stats".into()));
    }

    let stats_schedule = if stats_path.is_some() { build_schedule(&matches) } else { Vec::new() };

    Ok(Some(RunConfig { source, input, stats_path, stats_schedule }))
}

/// Extract a flag's single value, rejecting a second occurrence
/// (clap's `Append` action happily accepts repeats; the at-most-once
/// rule is this crate's own).
fn single_valued(matches: &clap::ArgMatches, name: &str) -> Result<Option<String>, Error> {
    match matches.get_many::<String>(name) {
        None => Ok(None),
        Some(values) => {
            let values: Vec<&String> = values.collect();
            match values.len() {
                0 => Ok(None),
                1 => Ok(Some(values[0].clone())),
                _ => Err(Error::Cli(format!("--{} may be given at most once", name))),
            }
        }
    }
}

/// Recover the appearance order of every stats-report flag and build
/// the ordered token schedule `StatsCollector::report` consumes.
fn build_schedule(matches: &clap::ArgMatches) -> Vec<StatsToken> {
    let mut ordered: Vec<(usize, StatsToken)> = Vec::new();

    let simple = [
        ("insts", StatsToken::Insts),
        ("hot", StatsToken::Hot),
        ("vars", StatsToken::Vars),
        ("frequent", StatsToken::Frequent),
        ("eol", StatsToken::Eol),
    ];
    for (name, token) in simple {
        if matches.get_flag(name) {
            if let Some(mut indices) = matches.indices_of(name) {
                if let Some(i) = indices.next() {
                    ordered.push((i, token));
                }
            }
        }
    }
    if let (Some(values), Some(indices)) = (matches.get_many::<String>("print"), matches.indices_of("print")) {
        for (i, v) in indices.zip(values) {
            ordered.push((i, StatsToken::Print(v.clone())));
        }
    }

    ordered.sort_by_key(|(i, _)| *i);
    ordered.into_iter().map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("ippcode23-vm".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn requires_source_or_input() {
        let err = parse(argv(&[])).unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn source_alone_is_valid() {
        let cfg = parse(argv(&["-s", "prog.xml"])).unwrap().unwrap();
        assert_eq!(cfg.source.as_deref(), Some("prog.xml"));
        assert_eq!(cfg.input, None);
    }

    #[test]
    fn duplicate_source_is_cli_error() {
        let err = parse(argv(&["-s", "a.xml", "-s", "b.xml"])).unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn stats_flag_without_stats_path_is_cli_error() {
        let err = parse(argv(&["-s", "prog.xml", "--insts"])).unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn help_combined_with_other_flag_is_cli_error() {
        let err = parse(argv(&["--help", "-s", "prog.xml"])).unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn help_alone_returns_none() {
        let result = parse(argv(&["--help"])).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn schedule_preserves_flag_order() {
        let cfg = parse(argv(&["-s", "p.xml", "--stats", "out.txt", "--vars", "--insts", "--eol"]))
            .unwrap()
            .unwrap();
        assert!(matches!(cfg.stats_schedule[0], StatsToken::Vars));
        assert!(matches!(cfg.stats_schedule[1], StatsToken::Insts));
        assert!(matches!(cfg.stats_schedule[2], StatsToken::Eol));
    }

    #[test]
    fn multiple_print_tokens_each_appended() {
        let cfg = parse(argv(&["-s", "p.xml", "--stats", "out.txt", "--print", "a", "--print", "b"]))
            .unwrap()
            .unwrap();
        let values: Vec<&str> = cfg
            .stats_schedule
            .iter()
            .filter_map(|t| match t {
                StatsToken::Print(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!["a", "b"]);
    }
}
