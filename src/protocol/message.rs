use super::frame::{Fields, FIELD_SEPARATOR};
use crate::{EmsError, GridView, Result, Seat, SessionEndpoints, SessionId, StatusCode};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Connect = 1,
    Quit = 2,
    Create = 3,
    Reserve = 4,
    Show = 5,
    List = 6,
}

impl OpCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Connect),
            2 => Some(Self::Quit),
            3 => Some(Self::Create),
            4 => Some(Self::Reserve),
            5 => Some(Self::Show),
            6 => Some(Self::List),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect(SessionEndpoints),
    Quit,
    Create { event_id: u32, rows: usize, cols: usize },
    Reserve { event_id: u32, seats: Vec<Seat> },
    Show { event_id: u32 },
    List,
}

fn path_field(path: &Path) -> Result<&str> {
    let text = path
        .to_str()
        .ok_or_else(|| EmsError::InvalidRequest(format!("Endpoint path is not UTF-8: {:?}", path)))?;
    if text.is_empty() || text.contains(FIELD_SEPARATOR) {
        return Err(EmsError::InvalidRequest(format!("Unusable endpoint path: {:?}", text)));
    }
    Ok(text)
}

impl Request {
    pub fn op_code(&self) -> OpCode {
        match self {
            Request::Connect(_) => OpCode::Connect,
            Request::Quit => OpCode::Quit,
            Request::Create { .. } => OpCode::Create,
            Request::Reserve { .. } => OpCode::Reserve,
            Request::Show { .. } => OpCode::Show,
            Request::List => OpCode::List,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let op = self.op_code().code();
        let text = match self {
            Request::Connect(endpoints) => format!(
                "{}|{}|{}",
                op,
                path_field(&endpoints.request)?,
                path_field(&endpoints.response)?
            ),
            Request::Quit | Request::List => op.to_string(),
            Request::Create { event_id, rows, cols } => {
                format!("{}|{}|{}|{}", op, event_id, rows, cols)
            }
            Request::Reserve { event_id, seats } => {
                let mut text = format!("{}|{}|{}", op, event_id, seats.len());
                for seat in seats {
                    let _ = write!(text, "|{}", seat.row);
                }
                for seat in seats {
                    let _ = write!(text, "|{}", seat.col);
                }
                text
            }
            Request::Show { event_id } => format!("{}|{}", op, event_id),
        };
        Ok(text)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let mut fields = Fields::new(text);
        let code: u8 = fields.next_number("operation code")?;
        let op = OpCode::from_code(code)
            .ok_or_else(|| EmsError::InvalidRequest(format!("Unknown operation code: {}", code)))?;

        let request = match op {
            OpCode::Connect => {
                let request = fields.next_str("request endpoint")?;
                let response = fields.next_str("response endpoint")?;
                if request.is_empty() || response.is_empty() {
                    return Err(EmsError::InvalidRequest("Empty endpoint path".to_string()));
                }
                Request::Connect(SessionEndpoints::new(request, response))
            }
            OpCode::Quit => Request::Quit,
            OpCode::Create => Request::Create {
                event_id: fields.next_number("event id")?,
                rows: fields.next_number("rows")?,
                cols: fields.next_number("cols")?,
            },
            OpCode::Reserve => {
                let event_id = fields.next_number("event id")?;
                let count: usize = fields.next_number("seat count")?;

                let mut rows = Vec::new();
                for _ in 0..count {
                    rows.push(fields.next_number::<usize>("row")?);
                }
                let mut seats = Vec::with_capacity(rows.len());
                for row in rows {
                    seats.push(Seat::new(row, fields.next_number("col")?));
                }
                Request::Reserve { event_id, seats }
            }
            OpCode::Show => Request::Show {
                event_id: fields.next_number("event id")?,
            },
            OpCode::List => Request::List,
        };

        fields.finish()?;
        Ok(request)
    }
}

/// In-band failure reported to the client. The session stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    AlreadyExists(u32),
    NotFound(u32),
    OutOfBounds { row: usize, col: usize },
    AlreadyReserved { row: usize, col: usize },
    InvalidRequest(String),
}

impl Failure {
    pub fn status(&self) -> StatusCode {
        match self {
            Failure::AlreadyExists(_) => StatusCode::AlreadyExists,
            Failure::NotFound(_) => StatusCode::NotFound,
            Failure::OutOfBounds { .. } => StatusCode::OutOfBounds,
            Failure::AlreadyReserved { .. } => StatusCode::AlreadyReserved,
            Failure::InvalidRequest(_) => StatusCode::InvalidRequest,
        }
    }

    pub fn into_error(self) -> EmsError {
        match self {
            Failure::AlreadyExists(id) => EmsError::AlreadyExists(id),
            Failure::NotFound(id) => EmsError::NotFound(id),
            Failure::OutOfBounds { row, col } => EmsError::OutOfBounds { row, col },
            Failure::AlreadyReserved { row, col } => EmsError::AlreadyReserved { row, col },
            Failure::InvalidRequest(message) => EmsError::InvalidRequest(message),
        }
    }
}

impl From<&EmsError> for Failure {
    fn from(error: &EmsError) -> Self {
        match error {
            EmsError::AlreadyExists(id) => Failure::AlreadyExists(*id),
            EmsError::NotFound(id) => Failure::NotFound(*id),
            EmsError::OutOfBounds { row, col } => Failure::OutOfBounds { row: *row, col: *col },
            EmsError::AlreadyReserved { row, col } => Failure::AlreadyReserved { row: *row, col: *col },
            EmsError::InvalidRequest(message) => Failure::InvalidRequest(message.clone()),
            other => Failure::InvalidRequest(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Connected(SessionId),
    Created,
    Reserved { reservation_id: u32 },
    Grid(GridView),
    Events(Vec<u32>),
    Failed(Failure),
}

impl Response {
    pub fn encode(&self) -> String {
        let ok = StatusCode::Ok.code();
        match self {
            Response::Connected(id) => id.to_string(),
            Response::Created => format!("{}|", ok),
            Response::Reserved { reservation_id } => format!("{}|{}", ok, reservation_id),
            Response::Grid(view) => format!("{}|{}", ok, render_grid(view)),
            Response::Events(ids) => format!("{}|{}", ok, render_events(ids)),
            Response::Failed(failure) => {
                let code = failure.status().code();
                match failure {
                    Failure::AlreadyExists(id) | Failure::NotFound(id) => format!("{}|{}", code, id),
                    Failure::OutOfBounds { row, col } | Failure::AlreadyReserved { row, col } => {
                        format!("{}|{}|{}", code, row, col)
                    }
                    Failure::InvalidRequest(message) => {
                        format!("{}|{}", code, message.replace(FIELD_SEPARATOR, "/"))
                    }
                }
            }
        }
    }

    /// Decodes the answer to a request with operation `op`.
    pub fn decode(op: OpCode, text: &str) -> Result<Self> {
        if op == OpCode::Connect {
            let id = text.trim().parse().map_err(|_| {
                EmsError::InvalidRequest(format!("Invalid session id: {:?}", text))
            })?;
            return Ok(Response::Connected(id));
        }

        let mut fields = Fields::new(text);
        let code: u8 = fields.next_number("status")?;
        let status = StatusCode::from_code(code)
            .ok_or_else(|| EmsError::InvalidRequest(format!("Unknown status code: {}", code)))?;

        let failure = match status {
            StatusCode::Ok => {
                return match op {
                    OpCode::Create => Ok(Response::Created),
                    OpCode::Reserve => Ok(Response::Reserved {
                        reservation_id: fields.next_number("reservation id")?,
                    }),
                    OpCode::Show => Ok(Response::Grid(parse_grid(&fields.rest())?)),
                    OpCode::List => Ok(Response::Events(parse_events(&fields.rest())?)),
                    OpCode::Connect | OpCode::Quit => Err(EmsError::InvalidRequest(format!(
                        "No response expected for {:?}",
                        op
                    ))),
                };
            }
            StatusCode::AlreadyExists => Failure::AlreadyExists(fields.next_number("event id")?),
            StatusCode::NotFound => Failure::NotFound(fields.next_number("event id")?),
            StatusCode::OutOfBounds => Failure::OutOfBounds {
                row: fields.next_number("row")?,
                col: fields.next_number("col")?,
            },
            StatusCode::AlreadyReserved => Failure::AlreadyReserved {
                row: fields.next_number("row")?,
                col: fields.next_number("col")?,
            },
            StatusCode::InvalidRequest => Failure::InvalidRequest(fields.rest()),
        };
        Ok(Response::Failed(failure))
    }

    /// Splits a response into its success value and an error.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Response::Failed(failure) => Err(failure.into_error()),
            other => Ok(other),
        }
    }
}

/// `rows|cols|` followed by one line per row of space separated seat values.
pub fn render_grid(view: &GridView) -> String {
    let mut text = format!("{}|{}|\n", view.rows, view.cols);
    for row in &view.seats {
        let line: Vec<String> = row.iter().map(u32::to_string).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }
    text
}

pub fn parse_grid(text: &str) -> Result<GridView> {
    let mut fields = Fields::new(text);
    let rows: usize = fields.next_number("rows")?;
    let cols: usize = fields.next_number("cols")?;
    let body = fields.rest();
    let body = body
        .strip_prefix('\n')
        .ok_or_else(|| EmsError::InvalidRequest("Grid body must start on a new line".to_string()))?;

    let seats = body
        .lines()
        .map(|line| {
            line.split_whitespace()
                .map(|value| {
                    value.parse().map_err(|_| {
                        EmsError::InvalidRequest(format!("Invalid seat value: {:?}", value))
                    })
                })
                .collect::<Result<Vec<u32>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    if seats.len() != rows || seats.iter().any(|row| row.len() != cols) {
        return Err(EmsError::InvalidRequest(format!(
            "Grid body does not match {}x{}",
            rows, cols
        )));
    }

    Ok(GridView { rows, cols, seats })
}

/// `count|` followed by one event id per line.
pub fn render_events(ids: &[u32]) -> String {
    let mut text = format!("{}|\n", ids.len());
    for id in ids {
        let _ = writeln!(text, "{}", id);
    }
    text
}

pub fn parse_events(text: &str) -> Result<Vec<u32>> {
    let mut fields = Fields::new(text);
    let count: usize = fields.next_number("event count")?;
    let body = fields.rest();

    let ids = body
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse()
                .map_err(|_| EmsError::InvalidRequest(format!("Invalid event id: {:?}", line)))
        })
        .collect::<Result<Vec<u32>>>()?;

    if ids.len() != count {
        return Err(EmsError::InvalidRequest(format!(
            "Expected {} events, got {}",
            count,
            ids.len()
        )));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_request_lists_rows_then_cols() {
        let request = Request::Reserve {
            event_id: 9,
            seats: vec![Seat::new(1, 2), Seat::new(3, 4)],
        };
        assert_eq!(request.encode().unwrap(), "4|9|2|1|3|2|4");
        assert_eq!(Request::decode("4|9|2|1|3|2|4").unwrap(), request);
    }

    #[test]
    fn reserve_with_missing_coordinates_is_invalid() {
        assert!(matches!(Request::decode("4|9|3|1|2|3|1"), Err(EmsError::InvalidRequest(_))));
        assert!(matches!(Request::decode("4|9|1|1|2|3"), Err(EmsError::InvalidRequest(_))));
    }

    #[test]
    fn malformed_requests_are_invalid() {
        for text in ["", "x", "9", "3|1|2", "3|a|2|2", "5", "6|1", "1|/tmp/req"] {
            assert!(
                matches!(Request::decode(text), Err(EmsError::InvalidRequest(_))),
                "{:?} should be rejected",
                text
            );
        }
    }

    #[test]
    fn connect_request_carries_both_endpoints() {
        let request = Request::Connect(SessionEndpoints::new("/tmp/req", "/tmp/resp"));
        assert_eq!(request.encode().unwrap(), "1|/tmp/req|/tmp/resp");
        assert_eq!(Request::decode("1|/tmp/req|/tmp/resp").unwrap(), request);

        let bad = Request::Connect(SessionEndpoints::new("/tmp/a|b", "/tmp/resp"));
        assert!(bad.encode().is_err());
    }

    #[test]
    fn grid_renders_one_line_per_row() {
        let view = GridView {
            rows: 2,
            cols: 2,
            seats: vec![vec![1, 0], vec![0, 0]],
        };
        assert_eq!(render_grid(&view), "2|2|\n1 0\n0 0\n");
        assert_eq!(Response::Grid(view.clone()).encode(), "0|2|2|\n1 0\n0 0\n");
        assert_eq!(
            Response::decode(OpCode::Show, "0|2|2|\n1 0\n0 0\n").unwrap(),
            Response::Grid(view)
        );
    }

    #[test]
    fn grid_body_must_match_dimensions() {
        assert!(parse_grid("2|2|\n1 0\n").is_err());
        assert!(parse_grid("1|2|\n1 0 0\n").is_err());
        assert!(parse_grid("1|1|1\n").is_err());
    }

    #[test]
    fn events_list_count_then_ids() {
        assert_eq!(Response::Events(vec![3, 1]).encode(), "0|2|\n3\n1\n");
        assert_eq!(Response::Events(vec![]).encode(), "0|0|\n");
        assert_eq!(
            Response::decode(OpCode::List, "0|2|\n3\n1\n").unwrap(),
            Response::Events(vec![3, 1])
        );
        assert!(parse_events("3|\n1\n").is_err());
    }

    #[test]
    fn failures_keep_their_kind_across_the_wire() {
        let cases = vec![
            (OpCode::Create, Failure::AlreadyExists(4)),
            (OpCode::Show, Failure::NotFound(8)),
            (OpCode::Reserve, Failure::OutOfBounds { row: 0, col: 3 }),
            (OpCode::Reserve, Failure::AlreadyReserved { row: 1, col: 1 }),
            (OpCode::List, Failure::InvalidRequest("Unknown operation code: 9".to_string())),
        ];

        for (op, failure) in cases {
            let text = Response::Failed(failure.clone()).encode();
            assert_eq!(Response::decode(op, &text).unwrap(), Response::Failed(failure));
        }
    }

    #[test]
    fn failed_response_converts_to_matching_error() {
        let err = Response::Failed(Failure::AlreadyReserved { row: 2, col: 1 })
            .into_result()
            .unwrap_err();
        assert!(matches!(err, EmsError::AlreadyReserved { row: 2, col: 1 }));
        assert!(Response::Created.into_result().is_ok());
    }

    #[test]
    fn connect_response_is_a_plain_integer() {
        assert_eq!(Response::Connected(3).encode(), "3");
        assert_eq!(Response::decode(OpCode::Connect, "3").unwrap(), Response::Connected(3));
    }
}
