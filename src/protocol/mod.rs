//! # ID-5001 Reply Frames
//!
//! The weather computer answers every `AT` command with one ASCII line
//! terminated by `\r`. A reading reply is laid out as:
//!
//! | Part         | Content                                          |
//! |--------------|--------------------------------------------------|
//! | extreme flag | optional `<` (high) or `>` (low), gust and chill |
//! | marker       | quantity tag, see the command table below         |
//! | body         | fixed-offset fields, see the layout table below   |
//!
//! ## Commands
//!
//! | Command | Marker | Reading                 |
//! |---------|--------|-------------------------|
//! | `RTI`   | `t`    | indoor temperature      |
//! | `RTO`   | `T`    | outdoor temperature     |
//! | `RHI`   | `h`    | indoor humidity         |
//! | `RHO`   | `H`    | outdoor humidity        |
//! | `RWA`   | `w`    | wind average            |
//! | `RWGH`  | `W`    | wind gust high          |
//! | `RB`    | `B`    | barometer               |
//! | `RR`    | `R`    | rain accumulator        |
//! | `RRR`   | `RR`   | rain rate               |
//! | `RWCA`  | `cT`   | wind chill              |
//!
//! ## Bodies
//!
//! | Shape      | Example     | Meaning                                   |
//! |------------|-------------|-------------------------------------------|
//! | `nnn`      | `072`       | °F, may be `-nn`                          |
//! | `nnnC`     | `022C`      | °C, may be `-nnC`                         |
//! | `nn`       | `45`        | % relative humidity                       |
//! | `nnnUdddD` | `010K270D`  | speed, unit (`K` kt, `L` km/h, `M` mph), direction |
//! | `nnnn`     | `2992`      | hundredths of inHg                        |
//! | `nnnnM`    | `1013M`     | millibars                                 |
//! | `nnnnn`    | `00125`     | hundredths of an inch                     |
//! | `nnnnnnC`  | `000254C`   | hundredths of a centimetre                |

use thiserror::Error;

pub mod units;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("expected marker {expected:?} in frame {frame:?}")]
    Marker { expected: &'static str, frame: String },

    #[error("unexpected extreme flag in frame {0:?}")]
    Extreme(String),

    #[error("no {kind:?} layout matches frame {frame:?}")]
    Layout { kind: FrameKind, frame: String },

    #[error("invalid {field} field {text:?} in frame {frame:?}")]
    Field {
        field: &'static str,
        text: String,
        frame: String,
    },

    #[error("reply exceeds {0} bytes without a line terminator")]
    TooLong(usize),

    #[error("no frame layout for command {0}")]
    UnknownCommand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Temperature,
    Humidity,
    Wind,
    Barometer,
    Rain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Fahrenheit,
    Celsius,
    Percent,
    Knots,
    KilometresPerHour,
    MilesPerHour,
    InchesHg,
    Millibar,
    Inches,
    Centimetres,
}

impl Unit {
    /// Converts a value expressed in this unit to the host's US unit system.
    pub fn to_us(self, value: f64) -> f64 {
        match self {
            Unit::Celsius => units::celsius_to_fahrenheit(value),
            Unit::Knots => units::knots_to_mph(value),
            Unit::KilometresPerHour => units::kph_to_mph(value),
            Unit::Millibar => units::mbar_to_inhg(value),
            Unit::Centimetres => units::cm_to_inches(value),
            Unit::Fahrenheit
            | Unit::Percent
            | Unit::MilesPerHour
            | Unit::InchesHg
            | Unit::Inches => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    High,
    Low,
}

impl Extreme {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'<' => Some(Extreme::High),
            b'>' => Some(Extreme::Low),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Extreme::High => '<',
            Extreme::Low => '>',
        }
    }
}

/// A numeric field inside a frame body.
#[derive(Debug, PartialEq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub scale: f64,
    /// Whether the first position may carry a `-` sign.
    pub signed: bool,
}

/// One body shape: its length, the unit it implies, the literal bytes that
/// identify it and the numeric fields it carries.
#[derive(Debug, PartialEq)]
pub struct BodyLayout {
    pub kind: FrameKind,
    pub len: usize,
    pub unit: Unit,
    pub fixed: &'static [(usize, u8)],
    pub fields: &'static [FieldLayout],
}

const TEMPERATURE_FIELDS: &[FieldLayout] = &[FieldLayout {
    name: "temperature",
    offset: 0,
    width: 3,
    scale: 1.0,
    signed: true,
}];

const WIND_FIELDS: &[FieldLayout] = &[
    FieldLayout {
        name: "speed",
        offset: 0,
        width: 3,
        scale: 1.0,
        signed: false,
    },
    FieldLayout {
        name: "direction",
        offset: 4,
        width: 3,
        scale: 1.0,
        signed: false,
    },
];

const BAROMETER_FIELDS_INHG: &[FieldLayout] = &[FieldLayout {
    name: "pressure",
    offset: 0,
    width: 4,
    scale: 0.01,
    signed: false,
}];

const BAROMETER_FIELDS_MBAR: &[FieldLayout] = &[FieldLayout {
    name: "pressure",
    offset: 0,
    width: 4,
    scale: 1.0,
    signed: false,
}];

pub const LAYOUTS: &[BodyLayout] = &[
    BodyLayout {
        kind: FrameKind::Temperature,
        len: 3,
        unit: Unit::Fahrenheit,
        fixed: &[],
        fields: TEMPERATURE_FIELDS,
    },
    BodyLayout {
        kind: FrameKind::Temperature,
        len: 4,
        unit: Unit::Celsius,
        fixed: &[(3, b'C')],
        fields: TEMPERATURE_FIELDS,
    },
    BodyLayout {
        kind: FrameKind::Humidity,
        len: 2,
        unit: Unit::Percent,
        fixed: &[],
        fields: &[FieldLayout {
            name: "humidity",
            offset: 0,
            width: 2,
            scale: 1.0,
            signed: false,
        }],
    },
    BodyLayout {
        kind: FrameKind::Wind,
        len: 8,
        unit: Unit::Knots,
        fixed: &[(3, b'K'), (7, b'D')],
        fields: WIND_FIELDS,
    },
    BodyLayout {
        kind: FrameKind::Wind,
        len: 8,
        unit: Unit::KilometresPerHour,
        fixed: &[(3, b'L'), (7, b'D')],
        fields: WIND_FIELDS,
    },
    BodyLayout {
        kind: FrameKind::Wind,
        len: 8,
        unit: Unit::MilesPerHour,
        fixed: &[(3, b'M'), (7, b'D')],
        fields: WIND_FIELDS,
    },
    BodyLayout {
        kind: FrameKind::Barometer,
        len: 4,
        unit: Unit::InchesHg,
        fixed: &[],
        fields: BAROMETER_FIELDS_INHG,
    },
    BodyLayout {
        kind: FrameKind::Barometer,
        len: 5,
        unit: Unit::Millibar,
        fixed: &[(4, b'M')],
        fields: BAROMETER_FIELDS_MBAR,
    },
    BodyLayout {
        kind: FrameKind::Rain,
        len: 5,
        unit: Unit::Inches,
        fixed: &[],
        fields: &[FieldLayout {
            name: "rain",
            offset: 0,
            width: 5,
            scale: 0.01,
            signed: false,
        }],
    },
    BodyLayout {
        kind: FrameKind::Rain,
        len: 7,
        unit: Unit::Centimetres,
        fixed: &[(6, b'C')],
        fields: &[FieldLayout {
            name: "rain",
            offset: 0,
            width: 6,
            scale: 0.01,
            signed: false,
        }],
    },
];

/// A reading command and the frame it is answered with.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: &'static str,
    pub marker: &'static str,
    pub kind: FrameKind,
    pub extreme: bool,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "RTI",
        marker: "t",
        kind: FrameKind::Temperature,
        extreme: false,
    },
    CommandSpec {
        command: "RTO",
        marker: "T",
        kind: FrameKind::Temperature,
        extreme: false,
    },
    CommandSpec {
        command: "RHI",
        marker: "h",
        kind: FrameKind::Humidity,
        extreme: false,
    },
    CommandSpec {
        command: "RHO",
        marker: "H",
        kind: FrameKind::Humidity,
        extreme: false,
    },
    CommandSpec {
        command: "RWA",
        marker: "w",
        kind: FrameKind::Wind,
        extreme: false,
    },
    CommandSpec {
        command: "RWGH",
        marker: "W",
        kind: FrameKind::Wind,
        extreme: true,
    },
    CommandSpec {
        command: "RB",
        marker: "B",
        kind: FrameKind::Barometer,
        extreme: false,
    },
    CommandSpec {
        command: "RR",
        marker: "R",
        kind: FrameKind::Rain,
        extreme: false,
    },
    CommandSpec {
        command: "RRR",
        marker: "RR",
        kind: FrameKind::Rain,
        extreme: false,
    },
    CommandSpec {
        command: "RWCA",
        marker: "cT",
        kind: FrameKind::Temperature,
        extreme: true,
    },
];

pub fn command_spec(command: &str) -> Result<&'static CommandSpec, FrameError> {
    COMMANDS
        .iter()
        .find(|spec| spec.command == command)
        .ok_or_else(|| FrameError::UnknownCommand(command.to_string()))
}

/// A validated reply frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    extreme: Option<Extreme>,
    marker: &'static str,
    layout: &'static BodyLayout,
    raw: Vec<i32>,
    /// Sign byte per field, kept so `-00` survives a round trip.
    negative: Vec<bool>,
}

impl Frame {
    /// Decodes one reply line (without its `\r`) answering `spec.command`.
    ///
    /// The whole line must match one layout of the expected kind; anything
    /// else is rejected without yielding any value.
    pub fn decode(spec: &CommandSpec, line: &str) -> Result<Self, FrameError> {
        let bytes = line.as_bytes();
        let Some(&first) = bytes.first() else {
            return Err(FrameError::Empty);
        };

        let (extreme, rest) = match Extreme::from_byte(first) {
            Some(_) if !spec.extreme => return Err(FrameError::Extreme(line.to_string())),
            Some(flag) => (Some(flag), &bytes[1..]),
            None => (None, bytes),
        };

        let body = rest
            .strip_prefix(spec.marker.as_bytes())
            .ok_or_else(|| FrameError::Marker {
                expected: spec.marker,
                frame: line.to_string(),
            })?;

        let layout = LAYOUTS
            .iter()
            .filter(|layout| layout.kind == spec.kind && layout.len == body.len())
            .find(|layout| layout.fixed.iter().all(|&(at, b)| body[at] == b))
            .ok_or_else(|| FrameError::Layout {
                kind: spec.kind,
                frame: line.to_string(),
            })?;

        let (raw, negative) = layout
            .fields
            .iter()
            .map(|field| parse_field(field, body, line))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip();

        Ok(Self {
            extreme,
            marker: spec.marker,
            layout,
            raw,
            negative,
        })
    }

    /// Writes the frame back in the station's wire format.
    pub fn encode(&self) -> String {
        let mut body = vec![b'0'; self.layout.len];
        for &(at, b) in self.layout.fixed {
            body[at] = b;
        }
        let values = self.raw.iter().zip(&self.negative);
        for (field, (&value, &negative)) in self.layout.fields.iter().zip(values) {
            let text = if negative {
                format!("-{:0width$}", value.unsigned_abs(), width = field.width - 1)
            } else {
                format!("{:0width$}", value, width = field.width)
            };
            body[field.offset..field.offset + field.width].copy_from_slice(text.as_bytes());
        }

        let mut out = String::with_capacity(self.layout.len + 3);
        if let Some(flag) = self.extreme {
            out.push(flag.as_char());
        }
        out.push_str(self.marker);
        // Body bytes are ASCII by construction.
        out.extend(body.iter().map(|&b| b as char));
        out
    }

    pub fn kind(&self) -> FrameKind {
        self.layout.kind
    }

    pub fn unit(&self) -> Unit {
        self.layout.unit
    }

    pub fn extreme(&self) -> Option<Extreme> {
        self.extreme
    }

    /// Raw integer content of the named field.
    pub fn raw(&self, name: &str) -> Option<i32> {
        self.layout
            .fields
            .iter()
            .position(|field| field.name == name)
            .map(|i| self.raw[i])
    }

    /// The frame's primary value, scaled, in the unit it was sent in.
    pub fn native_value(&self) -> f64 {
        let field = &self.layout.fields[0];
        self.raw[0] as f64 * field.scale
    }

    /// The frame's primary value converted to US units.
    pub fn value(&self) -> f64 {
        self.layout.unit.to_us(self.native_value())
    }

    /// Wind direction in compass degrees, for wind frames.
    pub fn direction(&self) -> Option<f64> {
        self.raw("direction").map(f64::from)
    }
}

/// Parses one field into its value and whether it carried a `-` sign.
fn parse_field(
    field: &FieldLayout,
    body: &[u8],
    line: &str,
) -> Result<(i32, bool), FrameError> {
    let text = &body[field.offset..field.offset + field.width];
    let invalid = || FrameError::Field {
        field: field.name,
        text: String::from_utf8_lossy(text).into_owned(),
        frame: line.to_string(),
    };

    let (negative, digits) = match text.split_first() {
        Some((b'-', digits)) if field.signed => (true, digits),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    let magnitude = digits
        .iter()
        .fold(0i32, |acc, &d| acc * 10 + i32::from(d - b'0'));
    Ok((if negative { -magnitude } else { magnitude }, negative))
}
