use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use babble::ContextManager;

const USAGE: &str = "usage: babble-chat --data-dir <dir> --context <id>";

fn parse_args() -> Option<(String, String)> {
    let mut data_dir = None;
    let mut context = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" => data_dir = args.next(),
            "--context" => context = args.next(),
            _ => return None,
        }
    }
    Some((data_dir?, context?))
}

fn words(rest: &str) -> Vec<String> {
    rest.split_whitespace().map(str::to_string).collect()
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some((data_dir, context_id)) = parse_args() else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };
    let manager = match ContextManager::new(&data_dir) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("cannot read {}: {}", data_dir, e);
            return ExitCode::FAILURE;
        }
    };
    let ctx = match manager.get_context(&context_id) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cannot open context {}: {}", context_id, e);
            return ExitCode::FAILURE;
        }
    };

    println!("babble chat on {}: /learn <text>, /ban <words>, /unban <words>, quit", ctx.id());
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            println!("Bye");
            break;
        }

        if let Some(rest) = line.strip_prefix("/learn ") {
            println!("learned {} line(s)", ctx.learn(&[rest]));
        } else if let Some(rest) = line.strip_prefix("/ban ") {
            match ctx.ban(&words(rest)) {
                Ok(()) => println!("banned: {}", ctx.banned_tokens().join(", ")),
                Err(e) => eprintln!("ban failed: {}", e),
            }
        } else if let Some(rest) = line.strip_prefix("/unban ") {
            match ctx.unban(&words(rest)) {
                Ok(()) => println!("banned: {}", ctx.banned_tokens().join(", ")),
                Err(e) => eprintln!("unban failed: {}", e),
            }
        } else {
            let replies = ctx.speak(line);
            if replies.is_empty() {
                println!("(nothing to say)");
            }
            for reply in replies {
                println!("[{:>3} {:>7.3}] {}", reply.score, reply.surprise, reply.text);
            }
        }
        let _ = stdout.flush();
    }
    manager.close();
    ExitCode::SUCCESS
}
