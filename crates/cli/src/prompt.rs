use signal_trader_core::{Position, ShutdownConfirm};
use std::io::{self, BufRead, BufReader, Stdin, Write};

/// Asks on the terminal whether to flatten before exiting.
pub struct ConsolePrompt<R> {
    input: R,
}

impl ConsolePrompt<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: BufRead> ConsolePrompt<R> {
    pub const fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead + Send> ShutdownConfirm for ConsolePrompt<R> {
    fn confirm_close_all(&mut self, open_positions: &[Position]) -> bool {
        println!();
        println!("{} position(s) still open:", open_positions.len());
        for position in open_positions {
            println!(
                "  {} {} {} @ {} (stop {}, target {})",
                position.side,
                position.size,
                position.symbol,
                position.entry_price,
                position.stop_loss,
                position.take_profit
            );
        }

        loop {
            print!("Close all positions at market before exiting? [y/n]: ");
            let _ = io::stdout().flush();

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    // EOF or unreadable stdin
                    tracing::warn!("No answer on stdin, leaving positions open");
                    return false;
                }
                Ok(_) => match parse_answer(&line) {
                    Some(answer) => return answer,
                    None => println!("Please answer y or n."),
                },
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
