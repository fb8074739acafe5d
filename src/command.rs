//! External-program backend.
//!
//! The speech model lives in its own runtime (typically a Python install of
//! the model package).  For every request the configured program is started
//! once:
//!
//! * the text is written to its **stdin** (never to argv, so arbitrary user
//!   text cannot turn into flags),
//! * `{speaker}`, `{speed}` and `{output}` in the argument template are
//!   replaced with the speaker id, the speed and the scratch output path,
//! * the program must exit 0 after writing a WAV file to `{output}`.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};

use crate::{
    backend::SynthesisBackend,
    config::GatewayConfig,
    speakers::{SpeakerId, SpeakerTable},
};

/// Characters of stderr kept in error messages.
const STDERR_TAIL: usize = 2_000;

pub struct CommandBackend {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    speakers: SpeakerTable,
}

impl CommandBackend {
    /// Resolve `program` and pair it with a speaker table.
    ///
    /// Fails when the program cannot be found (explicit paths must exist,
    /// bare names are looked up on `PATH`) or the speaker table is empty.
    pub fn load(
        program: &Path,
        args: Vec<String>,
        env: Vec<(String, String)>,
        speakers: SpeakerTable,
    ) -> Result<Self> {
        let program = resolve_program(program)?;
        if speakers.is_empty() {
            bail!("Speaker table is empty");
        }
        if !args.iter().any(|a| a.contains("{output}")) {
            bail!("Backend argument template has no {{output}} placeholder");
        }
        tracing::info!(program = %program.display(), ?args, "using external synthesis program");
        Ok(Self { program, args, env, speakers })
    }

    /// Build the backend described by `config`: program, argument template,
    /// process environment and speaker table (local file first, then hub).
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let program = config
            .backend_program
            .as_deref()
            .context("No backend program configured")?;
        let speakers = load_speakers(config)?;
        Self::load(program, config.backend_args(), config.backend_env()?, speakers)
    }

    fn render_args(&self, speaker: SpeakerId, speed: f32, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| {
                a.replace("{speaker}", &speaker.to_string())
                    .replace("{speed}", &speed.to_string())
                    .replace("{output}", &output)
            })
            .collect()
    }
}

fn load_speakers(config: &GatewayConfig) -> Result<SpeakerTable> {
    if let Some(path) = &config.speakers {
        return SpeakerTable::from_config_file(path);
    }
    match &config.model_repo {
        #[cfg(feature = "hub")]
        Some(repo) => {
            crate::download::load_speakers_from_hub(repo, config.hub_endpoint.as_deref())
        }
        #[cfg(not(feature = "hub"))]
        Some(repo) => bail!("Cannot fetch '{repo}': built without the `hub` feature"),
        None => bail!("No speaker table source configured (set --speakers or --model-repo)"),
    }
}

fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 {
        if !program.is_file() {
            bail!("Backend program not found: {}", program.display());
        }
        return Ok(program.to_path_buf());
    }
    which::which(program)
        .with_context(|| format!("Backend program '{}' not found on PATH", program.display()))
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match text.char_indices().rev().nth(STDERR_TAIL) {
        Some((i, _)) => format!("…{}", &text[i..]),
        None => text.to_string(),
    }
}

impl SynthesisBackend for CommandBackend {
    fn provider(&self) -> &str {
        "command"
    }

    fn speakers(&self) -> &SpeakerTable {
        &self.speakers
    }

    fn synthesize_to_file(
        &self,
        text: &str,
        speaker: SpeakerId,
        speed: f32,
        output: &Path,
    ) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.render_args(speaker, speed, output))
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Cannot start {}", self.program.display()))?;

        // Dropping stdin closes the pipe so the program sees EOF.  A program
        // that exits before reading is reported through its exit status.
        {
            let mut stdin = child.stdin.take().context("Backend stdin unavailable")?;
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    return Err(e).context("Cannot send text to backend");
                }
            }
        }

        let result = child.wait_with_output().context("Backend did not finish")?;
        if !result.status.success() {
            bail!("Backend exited with {}: {}", result.status, tail(&result.stderr));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn table() -> SpeakerTable {
        SpeakerTable::new([("ZH".to_string(), 1), ("EN".to_string(), 0)])
    }

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("synth.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn default_args() -> Vec<String> {
        crate::config::DEFAULT_BACKEND_ARGS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_args() {
        let dir = tempfile::tempdir().unwrap();
        let backend =
            CommandBackend::load(&script(dir.path(), "exit 0"), default_args(), vec![], table())
                .unwrap();
        let args = backend.render_args(1, 1.5, Path::new("/tmp/x/output.wav"));
        assert_eq!(args, vec!["--speaker", "1", "--speed", "1.5", "--output", "/tmp/x/output.wav"]);
    }

    #[test]
    fn test_load_rejects_missing_program() {
        let err = CommandBackend::load(
            Path::new("/definitely/not/here/synth"),
            default_args(),
            vec![],
            table(),
        );
        assert!(err.is_err());
        assert!(CommandBackend::load(
            Path::new("no-such-synthesiser-on-path"),
            default_args(),
            vec![],
            table()
        )
        .is_err());
    }

    #[test]
    fn test_load_rejects_empty_table_and_bad_template() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exit 0");
        assert!(CommandBackend::load(&program, default_args(), vec![], SpeakerTable::default())
            .is_err());
        assert!(CommandBackend::load(&program, vec!["--speaker".into()], vec![], table()).is_err());
    }

    #[test]
    fn test_program_receives_text_on_stdin_and_env() {
        let dir = tempfile::tempdir().unwrap();
        // Writes "<speaker>|<MARK>|<stdin>" into the output file.
        let program = script(
            dir.path(),
            r#"out=""; spk=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2;;
    --speaker) spk="$2"; shift 2;;
    *) shift;;
  esac
done
printf '%s|%s|' "$spk" "$MARK" > "$out"
cat >> "$out""#,
        );
        let backend = CommandBackend::load(
            &program,
            default_args(),
            vec![("MARK".to_string(), "env-ok".to_string())],
            table(),
        )
        .unwrap();

        let out = dir.path().join("out.wav");
        backend.synthesize_to_file("你好世界 --rm -rf", 1, 1.0, &out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "1|env-ok|你好世界 --rm -rf");
    }

    #[test]
    fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "cat > /dev/null; echo 'dictionary missing' >&2; exit 3");
        let backend = CommandBackend::load(&program, default_args(), vec![], table()).unwrap();
        let err = backend
            .synthesize_to_file("hello", 0, 1.0, &dir.path().join("out.wav"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("dictionary missing"));
    }

    #[test]
    fn test_from_config() {
        use clap::Parser;

        #[derive(Parser)]
        struct Harness {
            #[command(flatten)]
            config: GatewayConfig,
        }

        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exit 0");
        let speakers = dir.path().join("config.json");
        std::fs::write(&speakers, r#"{"data": {"spk2id": {"ZH": 1}}}"#).unwrap();

        let cfg = Harness::try_parse_from([
            "test",
            "--backend-program",
            program.to_str().unwrap(),
            "--speakers",
            speakers.to_str().unwrap(),
        ])
        .unwrap()
        .config;
        let backend = CommandBackend::from_config(&cfg).unwrap();
        assert_eq!(backend.speakers().get("ZH"), Some(1));

        let no_table = Harness::try_parse_from([
            "test",
            "--backend-program",
            program.to_str().unwrap(),
            "--speakers",
            dir.path().join("missing.json").to_str().unwrap(),
        ])
        .unwrap()
        .config;
        assert!(CommandBackend::from_config(&no_table).is_err());
    }

    #[test]
    fn test_tail_keeps_end_of_long_output() {
        let long = "x".repeat(STDERR_TAIL * 2) + "END";
        let t = tail(long.as_bytes());
        assert!(t.ends_with("END"));
        assert!(t.chars().count() <= STDERR_TAIL + 2);
        assert_eq!(tail(b"  short \n"), "short");
    }
}
