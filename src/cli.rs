use crate::dispatch::Dispatcher;
use std::io::{self, BufRead, Write};

/// REPL mode - interactive session over the same dispatcher the server uses
///
/// Protocol responses go to `output` exactly as a TCP client would see them.
pub fn run_repl(dispatcher: &Dispatcher, input: impl BufRead, mut output: impl Write) -> io::Result<()> {
    writeln!(output, "vemcache - in-memory vector cache")?;
    writeln!(output, "Type 'help' for commands, 'exit' or 'quit' to quit\n")?;

    let mut lines = input.lines();
    loop {
        write!(output, "vemcache> ")?;
        output.flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "exit" || line == "quit" {
            writeln!(output, "Goodbye!")?;
            break;
        }

        if line == "help" {
            print_help(&mut output)?;
            continue;
        }

        writeln!(output, "{}", dispatcher.handle_line(line))?;
    }

    Ok(())
}

fn print_help(output: &mut impl Write) -> io::Result<()> {
    writeln!(output, "Available commands:")?;
    writeln!(output, "  named_insert <key> <v1> <v2> ...  - Insert or replace a vector")?;
    writeln!(output, "  insert <v1> <v2> ...              - Insert under a generated key")?;
    writeln!(output, "  get <key>                         - Retrieve a vector")?;
    writeln!(output, "  remove <key>                      - Delete a vector")?;
    writeln!(output, "  knn <key> <k>                     - K most similar stored vectors")?;
    writeln!(output, "  vadd <key1> <key2>                - Component-wise sum")?;
    writeln!(output, "  vsub <key1> <key2>                - Component-wise difference")?;
    writeln!(output, "  vscale <key> <scalar>             - Multiply by a scalar")?;
    writeln!(output, "  vcosine <key1> <key2>             - Cosine similarity")?;
    writeln!(output, "  count                             - Number of stored vectors")?;
    writeln!(output, "  dump <name>                       - Write a snapshot into the dump dir")?;
    writeln!(output, "  ping                              - Liveness check")?;
    writeln!(output, "  help                              - Show this help")?;
    writeln!(output, "  exit, quit                        - Exit the program")?;
    Ok(())
}
