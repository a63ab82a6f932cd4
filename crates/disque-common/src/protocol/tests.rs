//! Integration tests for the protocol module
//!
//! These tests verify command construction, conversion of wire arrays back
//! into commands, and the error taxonomy.

#[cfg(test)]
mod tests {
    use super::super::*;
    use bytes::Bytes;

    #[test]
    fn test_command_creation() {
        let cmd = Command::new("PING");
        assert_eq!(cmd.name(), "PING");
        assert!(cmd.args().is_empty());
    }

    #[test]
    fn test_command_mixed_args() {
        let cmd = Command::new("ADDJOB")
            .arg("q1")
            .arg(String::from("body"))
            .arg(0u64)
            .arg("MAXLEN")
            .arg(10usize);
        let args: Vec<&[u8]> = cmd.args().iter().map(|a| a.as_ref()).collect();
        assert_eq!(args, vec![&b"q1"[..], b"body", b"0", b"MAXLEN", b"10"]);
    }

    #[test]
    fn test_command_args_from_iterator() {
        let cmd = Command::new("ACKJOB").args_from(["id1", "id2", "id3"]);
        assert_eq!(cmd.args().len(), 3);
        assert_eq!(cmd.arg_str(2), Some("id3"));
        assert_eq!(cmd.arg_str(3), None);
    }

    #[test]
    fn test_command_name_case_insensitive() {
        assert!(Command::new("hello").is("HELLO"));
        assert!(!Command::new("hello").is("HELP"));
    }

    #[test]
    fn test_command_from_wire_array() {
        let reply = Reply::array(vec![Reply::bulk_str("AUTH"), Reply::bulk_str("foobar")]);
        let cmd = Command::try_from(reply).unwrap();
        assert_eq!(cmd.name(), "AUTH");
        assert_eq!(cmd.args(), &[Bytes::from_static(b"foobar")]);
    }

    #[test]
    fn test_command_from_invalid_wire_values() {
        assert!(Command::try_from(Reply::Integer(1)).is_err());
        assert!(Command::try_from(Reply::array(vec![])).is_err());
        assert!(Command::try_from(Reply::array(vec![Reply::bulk_str("X"), Reply::Integer(2)])).is_err());
    }

    #[test]
    fn test_error_classification() {
        assert!(DisqueError::Command("ERR".into()).is_command_error());
        assert!(DisqueError::Connection("reset".into()).is_connection_error());
        assert!(DisqueError::Timeout(100).is_connection_error());
        assert!(!DisqueError::Cancelled.is_connection_error());
        assert!(!DisqueError::Auth("ERR invalid password".into()).is_command_error());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            DisqueError::Command("ERR unknown command 'FOOBAR'".into()).to_string(),
            "ERR unknown command 'FOOBAR'"
        );
        assert_eq!(DisqueError::Timeout(250).to_string(), "Request timeout after 250ms");
    }
}
