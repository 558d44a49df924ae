use event_manager::Seat;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { event_id: u32, rows: usize, cols: usize },
    Reserve { event_id: u32, seats: Vec<Seat> },
    Show { event_id: u32 },
    List,
    Wait(Duration),
    Help,
    Empty,
}

pub const HELP: &str = "Available commands:
  CREATE <event_id> <num_rows> <num_columns>
  RESERVE <event_id> [(<x1>,<y1>) (<x2>,<y2>) ...]
  SHOW <event_id>
  LIST
  WAIT <delay_ms>
  HELP
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCommand;

fn number<T: std::str::FromStr>(token: Option<&str>) -> Result<T, InvalidCommand> {
    token.ok_or(InvalidCommand)?.parse().map_err(|_| InvalidCommand)
}

fn parse_seat(token: &str) -> Result<Seat, InvalidCommand> {
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or(InvalidCommand)?;
    let (row, col) = inner.split_once(',').ok_or(InvalidCommand)?;
    Ok(Seat::new(
        row.trim().parse().map_err(|_| InvalidCommand)?,
        col.trim().parse().map_err(|_| InvalidCommand)?,
    ))
}

fn parse_seats(text: &str) -> Result<Vec<Seat>, InvalidCommand> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or(InvalidCommand)?;

    let seats = inner
        .split_whitespace()
        .map(parse_seat)
        .collect::<Result<Vec<_>, _>>()?;

    if seats.is_empty() {
        return Err(InvalidCommand);
    }
    Ok(seats)
}

pub fn parse_command(line: &str) -> Result<Command, InvalidCommand> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Command::Empty);
    }

    let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let mut tokens = rest.split_whitespace();

    let command = match keyword {
        "CREATE" => Command::Create {
            event_id: number(tokens.next())?,
            rows: number(tokens.next())?,
            cols: number(tokens.next())?,
        },
        "RESERVE" => {
            let rest = rest.trim_start();
            let (id, seats) = rest.split_once(char::is_whitespace).ok_or(InvalidCommand)?;
            return Ok(Command::Reserve {
                event_id: id.parse().map_err(|_| InvalidCommand)?,
                seats: parse_seats(seats)?,
            });
        }
        "SHOW" => Command::Show {
            event_id: number(tokens.next())?,
        },
        "LIST" => Command::List,
        "WAIT" => Command::Wait(Duration::from_millis(number(tokens.next())?)),
        "HELP" => Command::Help,
        _ => return Err(InvalidCommand),
    };

    if tokens.next().is_some() {
        return Err(InvalidCommand);
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        assert_eq!(
            parse_command("CREATE 1 10 20"),
            Ok(Command::Create { event_id: 1, rows: 10, cols: 20 })
        );
        assert_eq!(
            parse_command("RESERVE 4 [(1,1) (2,3)]"),
            Ok(Command::Reserve {
                event_id: 4,
                seats: vec![Seat::new(1, 1), Seat::new(2, 3)]
            })
        );
        assert_eq!(parse_command("SHOW 7"), Ok(Command::Show { event_id: 7 }));
        assert_eq!(parse_command("LIST"), Ok(Command::List));
        assert_eq!(parse_command("WAIT 250"), Ok(Command::Wait(Duration::from_millis(250))));
        assert_eq!(parse_command("HELP"), Ok(Command::Help));
        assert_eq!(parse_command("  # comment"), Ok(Command::Empty));
    }

    #[test]
    fn rejects_malformed_commands() {
        for line in [
            "CREATE 1 2",
            "CREATE a 2 2",
            "RESERVE 1",
            "RESERVE 1 []",
            "RESERVE 1 [(1;1)]",
            "SHOW",
            "LIST now",
            "DELETE 1",
        ] {
            assert_eq!(parse_command(line), Err(InvalidCommand), "{:?}", line);
        }
    }
}
