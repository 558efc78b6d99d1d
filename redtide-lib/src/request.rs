use derive_new::new;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};

/// Largest transfer a single request may ask for. One page.
pub const MAX_TRANSFER_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Direction {
    Read,
    Write,
}

/// Raw operation code as delivered by a transport.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Command(pub u32);

impl Command {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(2);

    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::READ => Some(Direction::Read),
            Self::WRITE => Some(Direction::Write),
            _ => None,
        }
    }
}

impl From<Direction> for Command {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Read => Self::READ,
            Direction::Write => Self::WRITE,
        }
    }
}

#[derive(Clone, Copy, CopyGetters, Debug, Eq, PartialEq, new)]
pub struct Request {
    #[get_copy = "pub"]
    command: Command,
    #[get_copy = "pub"]
    target_process_id: i32,
    #[get_copy = "pub"]
    virtual_address: u64,
    /// Signed as delivered; validated by the service.
    #[get_copy = "pub"]
    length: i32,
}

impl Request {
    pub fn read(target_process_id: i32, virtual_address: u64, length: i32) -> Self {
        Self::new(Command::READ, target_process_id, virtual_address, length)
    }

    pub fn write(target_process_id: i32, virtual_address: u64, length: i32) -> Self {
        Self::new(Command::WRITE, target_process_id, virtual_address, length)
    }
}

/// The principal issuing a request, as far as the transport can tell.
#[derive(Clone, Copy, CopyGetters, Debug, Default, Eq, PartialEq, new)]
pub struct Caller {
    #[get_copy = "pub"]
    pid: Option<i32>,
    #[get_copy = "pub"]
    uid: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes_map_to_directions() {
        assert_eq!(Command::READ.direction(), Some(Direction::Read));
        assert_eq!(Command::WRITE.direction(), Some(Direction::Write));
        assert_eq!(Command(0).direction(), None);
        assert_eq!(Command(3).direction(), None);
        assert_eq!(Command::from(Direction::Write), Command::WRITE);
    }

    #[test]
    fn unknown_peers_carry_no_identity() {
        let caller = Caller::default();
        assert_eq!(caller.pid(), None);
        assert_eq!(caller.uid(), None);
    }
}
