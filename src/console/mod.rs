//! Interactive console
//!
//! The view collaborator of the session substrate: renders listings and
//! status feeds, presents the blocking error dialog as a fenced block
//! acknowledged with Enter, and maps line commands 1:1 onto the feature
//! modules. Every invariant lives in the library; this is view glue.

pub mod render;

use crate::app::App;
use crate::config::Config;
use crate::files::{DecryptRequest, EncryptRequest, Files, SignRequest, VerifyRequest};
use crate::keyring::{KeyInfo, Keyring};
use crate::messaging::{Messaging, VerificationType};
use crate::notify::ViewSink;
use crate::session::{RunningStatus, SessionManager};
use crate::{clock::Clock, luks::Luks};
use anyhow::Result;
use colored::Colorize;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Login,
    Browser,
}

/// Console implementation of the view contract.
pub struct ConsoleView {
    mode: Mutex<Mode>,
    last_status: Mutex<Option<RunningStatus>>,
    /// Highest feed epochs already printed, `(log, notification)`.
    printed: Mutex<(i64, i64)>,
    shutdown: AtomicBool,
}

impl ConsoleView {
    pub fn new() -> ConsoleView {
        ConsoleView {
            mode: Mutex::new(Mode::Login),
            last_status: Mutex::new(None),
            printed: Mutex::new((0, 0)),
            shutdown: AtomicBool::new(false),
        }
    }

    fn mode(&self) -> Mode {
        *self.mode.lock().unwrap()
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for ConsoleView {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewSink for ConsoleView {
    fn error_dialog_opened(&self, messages: &[String]) {
        render::dialog_open(messages);
    }

    fn error_dialog_appended(&self, message: &str) {
        render::dialog_append(message);
    }

    fn show_login(&self) {
        let mut mode = self.mode.lock().unwrap();
        if *mode != Mode::Login {
            println!("{}", "session ended; login required".yellow());
        }
        *mode = Mode::Login;
    }

    fn show_browser(&self) {
        *self.mode.lock().unwrap() = Mode::Browser;
        println!("{}", "session open".green());
    }

    fn announce_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        println!("{}", "the appliance is shutting down".bold().yellow());
    }

    fn render_status(&self, status: &RunningStatus) {
        // Only feed entries newer than what was already printed; the
        // poller delivers the same tail every cycle.
        let mut printed = self.printed.lock().unwrap();
        for entry in &status.log {
            if entry.epoch > printed.0 {
                render::status_entry("log", entry);
                printed.0 = entry.epoch;
            }
        }
        for entry in &status.notification {
            if entry.epoch > printed.1 {
                render::status_entry("notice", entry);
                printed.1 = entry.epoch;
            }
        }
        *self.last_status.lock().unwrap() = Some(status.clone());
    }
}

/// Everything a command handler can reach.
struct Ctx {
    app: App,
    view: Arc<ConsoleView>,
    manager: Arc<SessionManager>,
    files: Arc<Files>,
    keyring: Arc<Keyring>,
    luks: Arc<Luks>,
    clock: Arc<Clock>,
    messaging: Arc<Messaging>,
    cwd: Arc<Mutex<String>>,
}

impl Ctx {
    fn cwd(&self) -> String {
        self.cwd.lock().unwrap().clone()
    }

    fn resolve(&self, arg: &str) -> String {
        resolve(&self.cwd(), arg)
    }
}

/// Runs the console until `quit`, EOF, Ctrl-C, or appliance shutdown.
pub async fn run(config: Config) -> Result<()> {
    let view = Arc::new(ConsoleView::new());
    let app = App::bootstrap(&config, view.clone() as Arc<dyn ViewSink>)?;
    println!("lockbox console, appliance at {}", config.server.url);
    app.started().await;

    let manager = app.modules.session.ready().await;
    let files = app.modules.files.ready().await;
    let keyring = app.modules.keyring.ready().await;
    let luks = app.modules.luks.ready().await;
    let clock = app.modules.clock.ready().await;
    let messaging = app.modules.messaging.ready().await;

    let cwd = Arc::new(Mutex::new("/".to_string()));
    {
        // Completion markers in the status log re-list the current
        // directory, which is the console's "file listing refresh".
        let files = Arc::clone(&files);
        let cwd = Arc::clone(&cwd);
        manager.set_refresh_hook(Arc::new(move || {
            let files = Arc::clone(&files);
            let cwd = Arc::clone(&cwd);
            tokio::spawn(async move {
                let path = cwd.lock().unwrap().clone();
                if let Ok(result) = files.list(&path, false).await {
                    render::listing(&path, &result);
                }
            });
        }));
    }

    let ctx = Ctx {
        app,
        view: Arc::clone(&view),
        manager,
        files,
        keyring,
        luks,
        clock,
        messaging,
        cwd,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if ctx.view.shutting_down() {
            break;
        }
        if ctx.app.bus.dialog_open() {
            let _ = read_line(&mut lines, "").await;
            ctx.app.bus.dialog_closed();
            continue;
        }

        let prompt = match ctx.view.mode() {
            Mode::Login => "lockbox (login)> ".to_string(),
            Mode::Browser => format!("lockbox {}> ", ctx.cwd()),
        };
        let line = match read_line(&mut lines, &prompt).await {
            Some(line) => line,
            None => break,
        };
        let args = tokenize(&line);
        if args.is_empty() {
            continue;
        }

        match args[0].as_str() {
            "quit" | "exit" => break,
            "help" => help(),
            cmd => {
                if !dispatch(&ctx, cmd, &args[1..], &mut lines).await {
                    println!("unknown command {cmd:?}; try `help`");
                }
            }
        }
    }

    Ok(())
}

/// Runs one command. Returns false for an unrecognized name. Operation
/// failures are not printed here; they surface through the event bus and
/// its dialog.
async fn dispatch(ctx: &Ctx, cmd: &str, args: &[String], lines: &mut Lines<BufReader<Stdin>>) -> bool {
    // Commands usable without a session.
    match cmd {
        "login" => {
            let volume = match args.first() {
                Some(volume) => volume.clone(),
                None => {
                    println!("usage: login <volume>");
                    return true;
                }
            };
            let password = ask(lines, "password: ").await;
            let dispose = ask(lines, "dispose password slot after unlock? [y/N] ").await;
            let _ = ctx
                .manager
                .login(&volume, &password, yes(&dispose))
                .await;
            return true;
        }
        "log" => {
            render::events(&ctx.app.bus.log_events());
            return true;
        }
        "register" => {
            let number = match args.first() {
                Some(number) => number.clone(),
                None => {
                    println!("usage: register <+number>");
                    return true;
                }
            };
            let via = ask(lines, "verification method [sms/voice]: ").await;
            let via = match via.as_str() {
                "sms" => VerificationType::Sms,
                "voice" => VerificationType::Voice,
                other => {
                    println!("unknown verification method {other:?}");
                    return true;
                }
            };
            if ctx.messaging.request_verification(&number, via).await.is_ok() {
                let code = ask(lines, "verification code: ").await;
                let _ = ctx.messaging.confirm_verification(&number, &code).await;
            }
            return true;
        }
        _ => {}
    }

    if ctx.view.mode() == Mode::Login {
        println!("no session; use `login <volume>`");
        return true;
    }

    match cmd {
        "ls" => {
            let path = args.first().map(|a| ctx.resolve(a)).unwrap_or_else(|| ctx.cwd());
            let sha256 = args.iter().any(|a| a == "-s");
            if let Ok(result) = ctx.files.list(&path, sha256).await {
                render::listing(&path, &result);
            }
        }
        "cd" => {
            let path = args.first().map(|a| ctx.resolve(a)).unwrap_or_else(|| "/".to_string());
            if ctx.files.list(&path, false).await.is_ok() {
                *ctx.cwd.lock().unwrap() = path;
            }
        }
        "mkdir" => {
            let paths: Vec<String> = args.iter().map(|a| ctx.resolve(a)).collect();
            if paths.is_empty() {
                println!("usage: mkdir <dir>...");
            } else {
                let _ = ctx.files.mkdir(&paths).await;
            }
        }
        "rm" => {
            let paths: Vec<String> = args.iter().map(|a| ctx.resolve(a)).collect();
            if paths.is_empty() {
                println!("usage: rm <path>...");
            } else {
                let _ = ctx.files.delete(&paths).await;
            }
        }
        "mv" | "cp" | "compress" | "extract" => {
            if args.len() < 2 {
                println!("usage: {cmd} <src>... <dst>");
                return true;
            }
            let dst = ctx.resolve(args.last().map(String::as_str).unwrap_or("/"));
            let src: Vec<String> = args[..args.len() - 1]
                .iter()
                .map(|a| ctx.resolve(a))
                .collect();
            let _ = match cmd {
                "mv" => ctx.files.move_paths(&src, &dst).await,
                "cp" => ctx.files.copy_paths(&src, &dst).await,
                "compress" => ctx.files.compress(&src, &dst).await,
                _ => ctx.files.extract(&src, &dst).await,
            };
        }
        "touch" => {
            let path = match args.first() {
                Some(path) => ctx.resolve(path),
                None => {
                    println!("usage: touch <path>");
                    return true;
                }
            };
            let contents = ask(lines, "contents (single line): ").await;
            let _ = ctx.files.new_file(&path, &contents).await;
        }
        "put" => {
            let local = match args.first() {
                Some(local) => PathBuf::from(local),
                None => {
                    println!("usage: put <local> [remote] [-f]");
                    return true;
                }
            };
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let overwrite = args.iter().any(|a| a == "-f");
            let remote = args
                .get(1)
                .filter(|a| a.as_str() != "-f")
                .map(|a| ctx.resolve(a))
                .unwrap_or_else(|| ctx.resolve(&name));
            if let Ok(size) = ctx.files.upload(&local, &remote, overwrite).await {
                println!("uploaded {remote} ({})", render::format_size(size));
                if let Ok(result) = ctx.files.list(&ctx.cwd(), false).await {
                    render::listing(&ctx.cwd(), &result);
                }
            }
        }
        "get" => {
            let remote = match args.first() {
                Some(remote) => ctx.resolve(remote),
                None => {
                    println!("usage: get <remote> [local]");
                    return true;
                }
            };
            let local = args.get(1).cloned().unwrap_or_else(|| {
                remote.rsplit('/').next().unwrap_or("download").to_string()
            });
            if let Ok(size) = ctx.files.download(&remote, PathBuf::from(&local).as_path()).await {
                println!("saved {local} ({})", render::format_size(size));
            }
        }
        "encrypt" => {
            let (src, cipher) = match (args.first(), args.get(1)) {
                (Some(src), Some(cipher)) => (ctx.resolve(src), cipher.clone()),
                _ => {
                    println!("usage: encrypt <file> <cipher>");
                    return true;
                }
            };
            let password = ask(lines, "password (empty for key): ").await;
            let key = ask(lines, "encryption key identifier (empty for none): ").await;
            let sig_key = ask(lines, "signature key identifier (empty for none): ").await;
            let wipe = ask(lines, "delete source after encryption? [y/N] ").await;
            let _ = ctx
                .files
                .encrypt(&EncryptRequest {
                    src,
                    cipher,
                    wipe_src: yes(&wipe),
                    sign: !sig_key.is_empty(),
                    password,
                    key,
                    sig_key,
                })
                .await;
        }
        "decrypt" => {
            let (src, cipher) = match (args.first(), args.get(1)) {
                (Some(src), Some(cipher)) => (ctx.resolve(src), cipher.clone()),
                _ => {
                    println!("usage: decrypt <file> <cipher>");
                    return true;
                }
            };
            let password = ask(lines, "password (empty for key): ").await;
            let key = ask(lines, "decryption key identifier (empty for none): ").await;
            let sig_key = ask(lines, "verification key identifier (empty for none): ").await;
            let _ = ctx
                .files
                .decrypt(&DecryptRequest {
                    src,
                    password,
                    verify: !sig_key.is_empty(),
                    key,
                    sig_key,
                    cipher,
                })
                .await;
        }
        "sign" => {
            let (src, cipher) = match (args.first(), args.get(1)) {
                (Some(src), Some(cipher)) => (ctx.resolve(src), cipher.clone()),
                _ => {
                    println!("usage: sign <file> <cipher>");
                    return true;
                }
            };
            let key = ask(lines, "signature key identifier: ").await;
            let password = ask(lines, "key password: ").await;
            let _ = ctx
                .files
                .sign(&SignRequest {
                    src,
                    cipher,
                    password,
                    key,
                })
                .await;
        }
        "verify" => {
            let (src, sig) = match (args.first(), args.get(1)) {
                (Some(src), Some(sig)) => (ctx.resolve(src), ctx.resolve(sig)),
                _ => {
                    println!("usage: verify <file> <signature>");
                    return true;
                }
            };
            let cipher = ask(lines, "cipher: ").await;
            let key = ask(lines, "verification key identifier: ").await;
            let _ = ctx
                .files
                .verify(&VerifyRequest {
                    src,
                    sig,
                    key,
                    cipher,
                })
                .await;
        }
        "ciphers" => {
            ctx.keyring.prime().await;
            render::ciphers(&ctx.keyring.ciphers().await);
        }
        "keys" => {
            ctx.keyring.prime().await;
            render::keys(&ctx.keyring.keys().await);
        }
        "genkey" => {
            let (identifier, cipher, key_format) = match (args.first(), args.get(1), args.get(2)) {
                (Some(i), Some(c), Some(f)) => (i.clone(), c.clone(), f.clone()),
                _ => {
                    println!("usage: genkey <identifier> <cipher> <key-format> [email]");
                    return true;
                }
            };
            let email = args.get(3).cloned().unwrap_or_default();
            let _ = ctx
                .keyring
                .generate_key(&identifier, &cipher, &key_format, &email)
                .await;
        }
        "keyinfo" => {
            let path = match args.first() {
                Some(path) => ctx.resolve(path),
                None => {
                    println!("usage: keyinfo <path>");
                    return true;
                }
            };
            if let Ok(info) = ctx.keyring.key_info(&path).await {
                println!("{info}");
            }
        }
        "putkey" => {
            let local = match args.first() {
                Some(local) => local.clone(),
                None => {
                    println!("usage: putkey <local-key-file>");
                    return true;
                }
            };
            let data = match tokio::fs::read_to_string(&local).await {
                Ok(data) => data,
                Err(e) => {
                    println!("cannot read {local}: {e}");
                    return true;
                }
            };
            let identifier = ask(lines, "key identifier: ").await;
            let cipher = ask(lines, "cipher: ").await;
            let key_format = ask(lines, "key format: ").await;
            let private = ask(lines, "private key? [y/N] ").await;
            let key = KeyInfo {
                identifier,
                key_format,
                cipher,
                private: yes(&private),
                path: String::new(),
            };
            let _ = ctx.keyring.upload_key(&key, &data).await;
        }
        "luks-add" | "luks-change" | "luks-remove" => {
            let volume = ctx
                .app
                .session
                .volume()
                .unwrap_or_else(default_volume);
            let password = ask(lines, "current password: ").await;
            let _ = match cmd {
                "luks-remove" => ctx.luks.remove_password(&volume, &password).await,
                _ => {
                    let new_password = ask(lines, "new password: ").await;
                    if cmd == "luks-add" {
                        ctx.luks.add_password(&volume, &password, &new_password).await
                    } else {
                        ctx.luks
                            .change_password(&volume, &password, &new_password)
                            .await
                    }
                }
            };
        }
        "settime" => {
            let _ = ctx.clock.sync().await;
        }
        "msg" => {
            if args.len() < 2 {
                println!("usage: msg \"Name +NUMBER\" <text>...");
                return true;
            }
            let contact = args[0].clone();
            let text = args[1..].join(" ");
            let _ = ctx.messaging.send(&contact, &text).await;
        }
        "history" => {
            let contact = match args.first() {
                Some(contact) => contact.clone(),
                None => {
                    println!("usage: history \"Name +NUMBER\"");
                    return true;
                }
            };
            if let Ok(transcript) = ctx.messaging.history(&contact).await {
                println!("{transcript}");
            }
        }
        "status" => match ctx.view.last_status.lock().unwrap().as_ref() {
            Some(status) => render::status(status),
            None => println!("no status received yet"),
        },
        "logout" => {
            let _ = ctx.manager.logout().await;
        }
        "poweroff" => {
            let confirm = ask(lines, "power off the appliance? [y/N] ").await;
            if yes(&confirm) {
                let _ = ctx.manager.poweroff().await;
            }
        }
        _ => return false,
    }
    true
}

fn help() {
    println!(
        "session:  login logout poweroff status log settime quit\n\
         files:    ls cd mkdir mv cp rm touch put get compress extract\n\
         crypto:   encrypt decrypt sign verify ciphers keys genkey keyinfo putkey\n\
         volume:   luks-add luks-change luks-remove\n\
         signal:   msg history register"
    );
}

// The LUKS commands can target a volume other than the mounted one;
// without a session volume fall back to the appliance default.
fn default_volume() -> String {
    "vol0".to_string()
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Option<String> {
    if !prompt.is_empty() {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
    }
    tokio::select! {
        line = lines.next_line() => line.ok().flatten(),
        _ = tokio::signal::ctrl_c() => None,
    }
}

async fn ask(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> String {
    read_line(lines, prompt).await.unwrap_or_default().trim().to_string()
}

fn yes(answer: &str) -> bool {
    matches!(answer, "y" | "Y" | "yes")
}

/// Splits a command line into tokens; double quotes group words.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => {
                if quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Resolves `arg` against `cwd` and normalizes `.`/`..` components.
fn resolve(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), arg)
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}
