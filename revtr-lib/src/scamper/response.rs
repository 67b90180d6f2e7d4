use crate::error::{Result, RevtrError};

/// One line of probe-daemon output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command accepted with the given daemon-side id.
    Ok(u32),
    Err(String),
    /// Announces a data block of the given length.
    Data(usize),
    More,
}

impl Response {
    /// Parses a response line (trailing newline allowed).
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\n', '\r']);

        if line.contains("OK") {
            let id = line
                .split(' ')
                .nth(1)
                .and_then(|tok| tok.split('-').nth(1))
                .and_then(|n| n.trim().parse::<u32>().ok())
                .ok_or_else(|| RevtrError::BadResponse(line.to_string()))?;
            return Ok(Response::Ok(id));
        }
        if line.contains("ERR") {
            return Ok(Response::Err(line.to_string()));
        }
        if line.contains("DATA") {
            let parts: Vec<&str> = line.split(' ').collect();
            if parts.len() != 2 {
                return Err(RevtrError::BadDataResponse(line.to_string()));
            }
            let len = parts[1]
                .trim()
                .parse::<usize>()
                .map_err(|_| RevtrError::BadDataResponse(line.to_string()))?;
            return Ok(Response::Data(len));
        }
        if line.contains("MORE") {
            return Ok(Response::More);
        }
        Err(RevtrError::BadResponse(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_kind() {
        assert_eq!(Response::parse("OK id-12\n").ok(), Some(Response::Ok(12)));
        assert_eq!(Response::parse("DATA 120\n").ok(), Some(Response::Data(120)));
        assert_eq!(Response::parse("MORE\n").ok(), Some(Response::More));
        assert!(matches!(Response::parse("ERR command not accepted\n"), Ok(Response::Err(_))));
    }

    #[test]
    fn ok_without_numeric_id_is_bad() {
        assert!(matches!(Response::parse("OK id-x\n"), Err(RevtrError::BadResponse(_))));
        assert!(matches!(Response::parse("OK\n"), Err(RevtrError::BadResponse(_))));
    }

    #[test]
    fn data_needs_exactly_two_tokens() {
        assert!(matches!(Response::parse("DATA 1 2\n"), Err(RevtrError::BadDataResponse(_))));
        assert!(matches!(Response::parse("DATA x\n"), Err(RevtrError::BadDataResponse(_))));
    }

    #[test]
    fn unknown_line_is_bad() {
        assert!(matches!(Response::parse("HELLO\n"), Err(RevtrError::BadResponse(_))));
    }
}
