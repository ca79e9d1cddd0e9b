use std::io::{self, BufRead, Write};

/// What the operator asked for between books.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    NextBook,
    Quit,
    Invalid(String),
}

pub fn parse_command(input: &str) -> OperatorCommand {
    match input.trim().to_lowercase().as_str() {
        "n" => OperatorCommand::NextBook,
        "q" => OperatorCommand::Quit,
        other => OperatorCommand::Invalid(other.to_string()),
    }
}

/// Prints `message` and blocks until a line (or end of input) arrives.
pub fn wait_for_enter<R: BufRead, W: Write>(input: &mut R, output: &mut W, message: &str) -> io::Result<()> {
    write!(output, "{}", message)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(())
}

/// Asks whether to capture another book. End of input counts as quitting.
pub fn ask_next_book<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<OperatorCommand> {
    write!(
        output,
        "\nNavigate to the next book in the browser.\n\
         Press 'n' and Enter to start scraping the new book, or 'q' and Enter to quit: "
    )?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(OperatorCommand::Quit);
    }

    Ok(parse_command(&line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(parse_command("n\n"), OperatorCommand::NextBook);
        assert_eq!(parse_command(" N "), OperatorCommand::NextBook);
        assert_eq!(parse_command("Q\r\n"), OperatorCommand::Quit);
        assert_eq!(parse_command("yes"), OperatorCommand::Invalid("yes".to_string()));
    }

    #[test]
    fn ask_next_book_reads_one_line() {
        let mut input = Cursor::new("n\nq\n");
        let mut output = Vec::new();

        assert_eq!(ask_next_book(&mut input, &mut output).unwrap(), OperatorCommand::NextBook);
        assert_eq!(ask_next_book(&mut input, &mut output).unwrap(), OperatorCommand::Quit);

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Press 'n' and Enter"));
    }

    #[test]
    fn end_of_input_quits() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();

        assert_eq!(ask_next_book(&mut input, &mut output).unwrap(), OperatorCommand::Quit);
    }

    #[test]
    fn wait_for_enter_prints_message() {
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        wait_for_enter(&mut input, &mut output, "Log in, then press Enter...").unwrap();
        assert_eq!(output, b"Log in, then press Enter...");
    }
}
