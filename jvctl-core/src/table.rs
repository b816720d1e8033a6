//! The command table: human command names mapped to wire bytes.
//!
//! A [`CommandTable`] is built once and handed to the session at
//! construction. [`CommandTable::builtin`] carries the vendor command
//! set for the D-ILA family (NZ/NX/NP and the earlier X/RS models);
//! custom tables can be assembled entry by entry for models with
//! firmware-specific additions.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::JvcError;
use crate::wire::AckClass;

/// Reply classes used by the builtin table.
pub mod ack {
    use crate::wire::AckClass;

    pub const POWER: AckClass = AckClass::new(*b"PW");
    pub const INPUT: AckClass = AckClass::new(*b"IP");
    pub const MENU: AckClass = AckClass::new(*b"RC");
    pub const PICTURE: AckClass = AckClass::new(*b"PM");
    pub const LENS: AckClass = AckClass::new(*b"IN");
    pub const SIGNAL: AckClass = AckClass::new(*b"IS");
    pub const INFO: AckClass = AckClass::new(*b"IF");
    pub const MODEL: AckClass = AckClass::new(*b"MD");
    pub const SOURCE: AckClass = AckClass::new(*b"SC");
}

// ── CommandKind ──────────────────────────────────────────────────

/// How a table entry may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Settable enumerated parameter. Also answers reference queries.
    Parameter,
    /// Read-only value, reference form only.
    Query,
    /// Operation with no parameter.
    Action,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::Parameter => "parameter",
            CommandKind::Query => "query",
            CommandKind::Action => "action",
        })
    }
}

// ── CommandSpec ──────────────────────────────────────────────────

/// One table entry: wire code, expected reply class and the parameter
/// value maps.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    code: Vec<u8>,
    ack: AckClass,
    kind: CommandKind,
    /// Parameter name to wire bytes, used when encoding operations.
    values: BTreeMap<String, Vec<u8>>,
    /// Reply bytes to name, when the reply vocabulary differs from the
    /// settable one (power accepts off/on but reports five states).
    replies: Option<BTreeMap<String, Vec<u8>>>,
}

impl CommandSpec {
    /// Settable command with an enumerated parameter.
    pub fn parameter(code: &[u8], ack: AckClass, values: &[(&str, &[u8])]) -> Self {
        CommandSpec {
            code: code.to_vec(),
            ack,
            kind: CommandKind::Parameter,
            values: to_map(values),
            replies: None,
        }
    }

    /// Settable command whose replies use a different value vocabulary.
    pub fn parameter_with_replies(
        code: &[u8],
        ack: AckClass,
        values: &[(&str, &[u8])],
        replies: &[(&str, &[u8])],
    ) -> Self {
        CommandSpec {
            code: code.to_vec(),
            ack,
            kind: CommandKind::Parameter,
            values: to_map(values),
            replies: Some(to_map(replies)),
        }
    }

    /// Read-only command answering with raw bytes (counters, strings).
    pub fn query(code: &[u8], ack: AckClass) -> Self {
        CommandSpec {
            code: code.to_vec(),
            ack,
            kind: CommandKind::Query,
            values: BTreeMap::new(),
            replies: None,
        }
    }

    /// Read-only command whose reply maps to a named value.
    pub fn query_mapped(code: &[u8], ack: AckClass, replies: &[(&str, &[u8])]) -> Self {
        CommandSpec {
            code: code.to_vec(),
            ack,
            kind: CommandKind::Query,
            values: BTreeMap::new(),
            replies: Some(to_map(replies)),
        }
    }

    /// Parameterless operation.
    pub fn action(code: &[u8], ack: AckClass) -> Self {
        CommandSpec {
            code: code.to_vec(),
            ack,
            kind: CommandKind::Action,
            values: BTreeMap::new(),
            replies: None,
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn ack(&self) -> AckClass {
        self.ack
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Settable parameter names, sorted.
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Wire bytes for a parameter name.
    pub fn parameter_bytes(&self, name: &str) -> Option<&[u8]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Maps reply value bytes back to a name, if this entry has a named
    /// reply vocabulary.
    pub fn reply_name(&self, value: &[u8]) -> Option<&str> {
        let map = self.replies.as_ref().unwrap_or(&self.values);
        map.iter()
            .find(|(_, bytes)| bytes.as_slice() == value)
            .map(|(name, _)| name.as_str())
    }
}

fn to_map(pairs: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
    pairs
        .iter()
        .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
        .collect()
}

// ── CommandTable ─────────────────────────────────────────────────

/// Immutable name to [`CommandSpec`] mapping.
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: BTreeMap<String, CommandSpec>,
}

impl CommandTable {
    /// Empty table, for callers assembling a custom command set.
    pub fn new() -> Self {
        CommandTable {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, spec: CommandSpec) {
        self.entries.insert(name.to_string(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.entries.get(name)
    }

    /// Like [`get`](Self::get) but with the typed caller error.
    pub fn spec(&self, name: &str) -> Result<&CommandSpec, JvcError> {
        self.entries
            .get(name)
            .ok_or_else(|| JvcError::UnknownCommand(name.to_string()))
    }

    /// Command names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries as (name, spec) pairs, sorted by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CommandSpec)> {
        self.entries.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the entry whose wire code prefixes `body` and returns it
    /// with the trailing parameter bytes. Longest code wins, so `RC7374`
    /// resolves to the info action rather than the `RC73` menu command.
    ///
    /// This is the device-side lookup used by the simulator.
    pub fn classify<'a, 'b>(&'a self, body: &'b [u8]) -> Option<(&'a str, &'a CommandSpec, &'b [u8])> {
        self.entries
            .iter()
            .filter(|(_, spec)| body.starts_with(&spec.code))
            .max_by_key(|(_, spec)| spec.code.len())
            .map(|(name, spec)| (name.as_str(), spec, &body[spec.code.len()..]))
    }

    /// The vendor command set.
    pub fn builtin() -> Self {
        let mut t = CommandTable::new();

        // power
        t.insert(
            "power",
            CommandSpec::parameter_with_replies(
                b"PW",
                ack::POWER,
                &[("off", b"0"), ("on", b"1")],
                &[
                    ("standby", b"0"),
                    ("on", b"1"),
                    ("cooling", b"2"),
                    ("warming", b"3"),
                    ("emergency", b"4"),
                ],
            ),
        );

        // input
        t.insert(
            "input_mode",
            CommandSpec::parameter(b"IP", ack::INPUT, &[("hdmi1", b"6"), ("hdmi2", b"7")]),
        );

        // lens memory / installation modes
        t.insert(
            "installation_mode",
            CommandSpec::parameter(
                b"INML",
                ack::LENS,
                &[
                    ("mode1", b"0"),
                    ("mode2", b"1"),
                    ("mode3", b"2"),
                    ("mode4", b"3"),
                    ("mode5", b"4"),
                    ("mode6", b"5"),
                    ("mode7", b"6"),
                    ("mode8", b"7"),
                    ("mode9", b"8"),
                    ("mode10", b"9"),
                ],
            ),
        );
        t.insert(
            "anamorphic",
            CommandSpec::parameter(
                b"INVS",
                ack::LENS,
                &[("off", b"0"), ("a", b"1"), ("b", b"2"), ("c", b"3"), ("d", b"4")],
            ),
        );

        // picture modes
        t.insert(
            "picture_mode",
            CommandSpec::parameter(
                b"PMPM",
                ack::PICTURE,
                &[
                    ("film", b"00"),
                    ("cinema", b"01"),
                    ("natural", b"03"),
                    ("hdr", b"04"),
                    ("hdr10", b"04"),
                    ("thx", b"06"),
                    ("frame_adapt_hdr", b"0B"),
                    ("frame_adapt_hdr1", b"0B"),
                    ("user1", b"0C"),
                    ("user2", b"0D"),
                    ("user3", b"0E"),
                    ("user4", b"0F"),
                    ("user5", b"10"),
                    ("user6", b"11"),
                    ("hlg", b"14"),
                    ("hdr_plus", b"15"),
                    ("hdr10_plus", b"15"),
                    ("pana_pq", b"16"),
                    // firmware 2.0 and up
                    ("filmmaker", b"17"),
                    ("frame_adapt_hdr2", b"18"),
                    ("frame_adapt_hdr3", b"19"),
                ],
            ),
        );
        t.insert(
            "low_latency",
            CommandSpec::parameter(b"PMLL", ack::PICTURE, &[("off", b"0"), ("on", b"1")]),
        );
        t.insert(
            "enhance",
            CommandSpec::parameter(b"PMEN", ack::PICTURE, NUMERIC),
        );
        t.insert(
            "motion_enhance",
            CommandSpec::parameter(
                b"PMME",
                ack::PICTURE,
                &[("off", b"0"), ("low", b"1"), ("high", b"2")],
            ),
        );
        t.insert(
            "graphic_mode",
            CommandSpec::parameter(
                b"PMGM",
                ack::PICTURE,
                &[("standard", b"0"), ("hires1", b"1"), ("hires2", b"2")],
            ),
        );
        t.insert(
            "eshift_mode",
            CommandSpec::parameter(b"PMUS", ack::PICTURE, &[("off", b"0"), ("on", b"1")]),
        );
        t.insert(
            "aperture",
            CommandSpec::parameter(
                b"PMDI",
                ack::PICTURE,
                &[("off", b"0"), ("auto1", b"1"), ("auto2", b"2")],
            ),
        );

        // content type / HDR pipeline
        t.insert(
            "content_type",
            CommandSpec::parameter(
                b"PMCT",
                ack::PICTURE,
                &[
                    ("auto", b"0"),
                    ("sdr", b"1"),
                    ("hdr10_plus", b"2"),
                    ("hdr10", b"3"),
                    ("hlg", b"4"),
                ],
            ),
        );
        t.insert(
            "content_type_trans",
            CommandSpec::parameter(
                b"PMAT",
                ack::PICTURE,
                &[("sdr", b"1"), ("hdr10_plus", b"2"), ("hdr10", b"3"), ("hlg", b"4")],
            ),
        );
        t.insert(
            "hdr_processing",
            CommandSpec::parameter(
                b"PMHP",
                ack::PICTURE,
                &[
                    ("hdr10_plus", b"0"),
                    ("static", b"1"),
                    ("frame_by_frame", b"2"),
                    ("scene_by_scene", b"3"),
                ],
            ),
        );
        t.insert(
            "hdr_level",
            CommandSpec::parameter(
                b"PMHL",
                ack::PICTURE,
                &[
                    ("auto", b"0"),
                    ("min2", b"1"),
                    ("min1", b"2"),
                    ("zero", b"3"),
                    ("plus1", b"4"),
                    ("plus2", b"5"),
                ],
            ),
        );
        t.insert(
            "theater_optimizer",
            CommandSpec::parameter(b"PMNM", ack::PICTURE, &[("off", b"0"), ("on", b"1")]),
        );
        t.insert(
            "hdr_data",
            CommandSpec::query_mapped(
                b"IFHR",
                ack::INFO,
                &[
                    ("sdr", b"0"),
                    ("hdr", b"1"),
                    ("smpte", b"2"),
                    ("hybridlog", b"3"),
                    ("hdr10_plus", b"4"),
                    ("none", b"F"),
                ],
            ),
        );

        // signal path
        t.insert(
            "color_mode",
            CommandSpec::parameter(
                b"ISHS",
                ack::SIGNAL,
                &[("auto", b"0"), ("ycbcr444", b"1"), ("ycbcr422", b"2"), ("rgb", b"3")],
            ),
        );
        t.insert(
            "aspect_ratio",
            CommandSpec::parameter(
                b"ISAS",
                ack::SIGNAL,
                &[("zoom", b"2"), ("auto", b"3"), ("native", b"4")],
            ),
        );
        t.insert(
            "input_level",
            CommandSpec::parameter(
                b"ISIL",
                ack::SIGNAL,
                &[
                    ("standard", b"0"),
                    ("enhanced", b"1"),
                    ("superwhite", b"2"),
                    ("auto", b"3"),
                ],
            ),
        );
        t.insert(
            "mask",
            CommandSpec::parameter(b"ISMA", ack::SIGNAL, &[("on", b"1"), ("off", b"2")]),
        );

        // 3D
        t.insert(
            "signal_3d",
            CommandSpec::parameter(
                b"IS3D",
                ack::SIGNAL,
                &[("2d", b"0"), ("auto", b"1"), ("sbs", b"3"), ("tb", b"4")],
            ),
        );
        t.insert(
            "signal_3d_phase",
            CommandSpec::parameter(b"IS3P", ack::SIGNAL, NUMERIC),
        );
        t.insert(
            "signal_3d_parallax",
            CommandSpec::parameter(b"ISLV", ack::SIGNAL, NUMERIC),
        );
        t.insert(
            "signal_3d_crosstalk",
            CommandSpec::parameter(b"ISCA", ack::SIGNAL, NUMERIC),
        );
        t.insert(
            "signal_3d_pm",
            CommandSpec::parameter(b"ISS3", ack::SIGNAL, PICTURE_MODES_3D),
        );
        t.insert(
            "signal_2d_pm",
            CommandSpec::parameter(b"ISS2", ack::SIGNAL, PICTURE_MODES_3D),
        );

        // light source
        t.insert(
            "laser_power",
            CommandSpec::parameter(
                b"PMLP",
                ack::PICTURE,
                &[("low", b"0"), ("med", b"2"), ("high", b"1")],
            ),
        );
        t.insert(
            "laser_mode",
            CommandSpec::parameter(
                b"PMDC",
                ack::PICTURE,
                &[("off", b"0"), ("auto1", b"1"), ("auto2", b"2"), ("auto3", b"3")],
            ),
        );
        // firmware 3.0 and up
        t.insert("laser_value", CommandSpec::query(b"PMCV", ack::PICTURE));
        // lamp models share the laser_power code
        t.insert(
            "lamp_power",
            CommandSpec::parameter(b"PMLP", ack::PICTURE, &[("normal", b"0"), ("high", b"1")]),
        );
        t.insert("lamp_time", CommandSpec::query(b"IFLT", ack::INFO));

        // menu remote
        t.insert(
            "menu",
            CommandSpec::parameter(
                b"RC73",
                ack::MENU,
                &[
                    ("menu", b"2E"),
                    ("lens_control", b"30"),
                    ("up", b"01"),
                    ("down", b"02"),
                    ("back", b"03"),
                    ("left", b"36"),
                    ("right", b"34"),
                    ("ok", b"2F"),
                ],
            ),
        );
        t.insert("info", CommandSpec::action(b"RC7374", ack::MENU));

        // device identity / counters
        t.insert("model", CommandSpec::query(b"MD", ack::MODEL));
        t.insert("software_version", CommandSpec::query(b"IFSV", ack::INFO));

        // source
        t.insert(
            "source_status",
            CommandSpec::query_mapped(
                b"SC",
                ack::SOURCE,
                &[("logo", b"\x00"), ("no_signal", b"0"), ("signal", b"1")],
            ),
        );
        t.insert(
            "source_display",
            CommandSpec::query_mapped(b"IFIS", ack::INFO, RESOLUTIONS),
        );

        t
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        CommandTable::builtin()
    }
}

// ── Shared value vocabularies ────────────────────────────────────

/// Two's-complement hex values shared by enhance and the 3D trims.
const NUMERIC: &[(&str, &[u8])] = &[
    ("zero", b"0000"),
    ("one", b"0001"),
    ("two", b"0002"),
    ("three", b"0003"),
    ("four", b"0004"),
    ("five", b"0005"),
    ("six", b"0006"),
    ("seven", b"0007"),
    ("eight", b"0008"),
    ("nine", b"0009"),
    ("ten", b"000A"),
];

const PICTURE_MODES_3D: &[(&str, &[u8])] = &[
    ("natural", b"1"),
    ("user1", b"2"),
    ("user2", b"3"),
    ("user3", b"4"),
    ("cinema", b"8"),
    ("film", b"9"),
    ("last", b"F"),
];

const RESOLUTIONS: &[(&str, &[u8])] = &[
    ("480p", b"02"),
    ("576p", b"03"),
    ("720p50", b"04"),
    ("720p60", b"05"),
    ("1080i50", b"06"),
    ("1080i60", b"07"),
    ("1080p24", b"08"),
    ("1080p50", b"09"),
    ("1080p60", b"0A"),
    ("no_signal", b"0B"),
    ("720p_3d", b"0C"),
    ("1080i_3d", b"0D"),
    ("1080p_3d", b"0E"),
    ("out_of_range", b"0F"),
    ("4k4096p60", b"10"),
    ("4k4096p50", b"11"),
    ("4k4096p30", b"12"),
    ("4k4096p25", b"13"),
    ("4k4096p24", b"14"),
    ("4k3840p60", b"15"),
    ("4k3840p50", b"16"),
    ("4k3840p30", b"17"),
    ("4k3840p25", b"18"),
    ("4k3840p24", b"19"),
    ("1080p25", b"1C"),
    ("1080p30", b"1D"),
    ("2048x1080p24", b"1E"),
    ("2048x1080p25", b"1F"),
    ("2048x1080p30", b"20"),
    ("2048x1080p50", b"21"),
    ("2048x1080p60", b"22"),
    ("3840x2160p120", b"23"),
    ("4096x2160p120", b"24"),
    ("vga_640x480", b"25"),
    ("svga_800x600", b"26"),
    ("xga_1024x768", b"27"),
    ("sxga_1280x1024", b"28"),
    ("wxga_1280x768", b"29"),
    ("wxga_plus_1440x900", b"2A"),
    ("wsxga_plus_1680x1050", b"2B"),
    ("wuxga_1920x1200", b"2C"),
    ("wxga_1280x800", b"2D"),
    ("fwxga_1366x768", b"2E"),
    ("hd_plus_1600x900", b"2F"),
    ("uxga_1600x1200", b"30"),
    ("qxga", b"31"),
    ("woxga", b"32"),
    ("4096x2160p100", b"34"),
    ("3840x2160p100", b"35"),
    ("1080p100", b"36"),
    ("1080p120", b"37"),
    ("8k7680x4320p60", b"38"),
    ("8k7680x4320p50", b"39"),
    ("8k7680x4320p30", b"3A"),
    ("8k7680x4320p25", b"3B"),
    ("8k7680x4320p24", b"3C"),
    ("wqhd60", b"3D"),
    ("woqhd120", b"3E"),
    ("8k7680x4320p48", b"3F"),
];
