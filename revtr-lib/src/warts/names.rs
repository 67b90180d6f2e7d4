use std::fmt;
use std::str::FromStr;

/// Error returned when a name or code is not part of a name table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {table} value: {value}")]
pub struct UnknownName {
    pub table: &'static str,
    pub value: String,
}

/// Defines a `u8`-coded enum whose variants render as the given names.
macro_rules! name_table {
    ($(#[$meta:meta])* $name:ident, $table:literal { $($variant:ident = $code:literal => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> u8 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = UnknownName;

            fn try_from(code: u8) -> Result<Self, UnknownName> {
                match code {
                    $($code => Ok($name::$variant),)+
                    other => Err(UnknownName { table: $table, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownName { table: $table, value: other.to_string() }),
                }
            }
        }
    };
}

name_table! {
    /// Probe method of a ping.
    PingMethod, "ping method" {
        IcmpEcho = 0 => "icmp-echo",
        TcpAck = 1 => "tcp-ack",
        TcpAckSport = 2 => "tcp-ack-sport",
        Udp = 3 => "udp",
        UdpDport = 4 => "udp-dport",
        IcmpTime = 5 => "icmp-time",
        TcpSyn = 6 => "tcp-syn",
    }
}

name_table! {
    /// Bits of the ping flag byte; the code is the bit index.
    PingFlag, "ping flag" {
        V4rr = 0 => "v4rr",
        Spoof = 1 => "spoof",
        Payload = 2 => "payload",
        TsOnly = 3 => "tsonly",
        TsAndAddr = 4 => "tsandaddr",
        IcmpSum = 5 => "icmpsum",
        Dl = 6 => "dl",
        Eight = 7 => "8",
    }
}

impl PingFlag {
    pub fn mask(self) -> u8 {
        1 << self.code()
    }

    /// Names of every flag set in `bits`, lowest bit first.
    pub fn names(bits: u8) -> Vec<String> {
        Self::ALL
            .iter()
            .filter(|f| bits & f.mask() != 0)
            .map(|f| f.to_string())
            .collect()
    }
}

name_table! {
    /// Probe method of a traceroute.
    TraceType, "trace type" {
        Null = 0 => "NULL",
        IcmpEcho = 1 => "icmp-echo",
        Udp = 2 => "udp",
        Tcp = 3 => "tcp",
        IcmpEchoParis = 4 => "icmp-echo-paris",
        UdpParis = 5 => "udp-paris",
        TcpAck = 6 => "tcp-ack",
    }
}

name_table! {
    /// Why a traceroute stopped.
    StopReason, "stop reason" {
        None = 0 => "NONE",
        Completed = 1 => "COMPLETED",
        Unreach = 2 => "UNREACH",
        Icmp = 3 => "ICMP",
        Loop = 4 => "LOOP",
        GapLimit = 5 => "GAPLIMIT",
        Error = 6 => "ERROR",
        HopLimit = 7 => "HOPLIMIT",
        Gss = 8 => "GSS",
        Halted = 9 => "HALTED",
    }
}

/// Transport protocol of a ping reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyProto {
    Icmp,
    Tcp,
    Udp,
}

impl ReplyProto {
    /// Unknown protocol numbers are reported as ICMP.
    pub fn from_code(code: u8) -> Self {
        match code {
            6 => ReplyProto::Tcp,
            17 => ReplyProto::Udp,
            _ => ReplyProto::Icmp,
        }
    }
}

impl fmt::Display for ReplyProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReplyProto::Icmp => "icmp",
            ReplyProto::Tcp => "tcp",
            ReplyProto::Udp => "udp",
        })
    }
}

impl FromStr for ReplyProto {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icmp" => Ok(ReplyProto::Icmp),
            "tcp" => Ok(ReplyProto::Tcp),
            "udp" => Ok(ReplyProto::Udp),
            other => Err(UnknownName { table: "reply proto", value: other.to_string() }),
        }
    }
}
