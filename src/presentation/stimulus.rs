//! Stimulus, background and presentation result types.

use crate::camera::SampleResponse;
use crate::error::{OpiError, OpiResult};
use crate::protocol::Args;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Declares a closed set of names parsed case-insensitively from the wire.
macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Legal wire names.
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            /// Wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = OpiError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(if s.eq_ignore_ascii_case($text) {
                    return Ok(Self::$variant);
                })+
                Err(OpiError::UnknownEnumValue {
                    name: stringify!($name).to_ascii_lowercase(),
                    value: s.to_string(),
                    legal: Self::NAMES.iter().map(|n| n.to_string()).collect(),
                })
            }
        }
    };
}

named_enum! {
    /// Ocular target of a stimulus or sample.
    Eye {
        /// Left eye only.
        Left => "left",
        /// Right eye only.
        Right => "right",
        /// Both eyes.
        Both => "both",
    }
}

named_enum! {
    /// Outline of a stimulus or fixation target.
    Shape {
        /// Filled circle.
        Circle => "circle",
        /// Filled square.
        Square => "square",
        /// Filled triangle.
        Triangle => "triangle",
        /// Ring.
        Annulus => "annulus",
        /// Plus sign.
        Cross => "cross",
        /// Maltese cross.
        Maltese => "maltese",
        /// Letter optotype.
        Optotype => "optotype",
    }
}

named_enum! {
    /// Surface pattern drawn inside a shape.
    Texture {
        /// Uniform colour.
        Flat => "flat",
        /// Checkerboard between the two colours.
        Checkerboard => "checkerboard",
        /// Sinusoidal grating.
        Sine => "sine",
        /// Square-wave grating.
        Squaresine => "squaresine",
        /// First-order Gaussian.
        G1 => "g1",
        /// Second-order Gaussian.
        G2 => "g2",
        /// Third-order Gaussian.
        G3 => "g3",
        /// Image loaded from a file.
        Image => "image",
        /// Rendered text.
        Text => "text",
    }
}

/// RGB colour with components in [0, 1].
pub type Rgb = [f64; 3];

const WHITE: Rgb = [1.0, 1.0, 1.0];

/// One visual target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stimulus {
    /// Eye the stimulus is shown to.
    pub eye: Eye,
    /// Outline.
    pub shape: Shape,
    /// Surface pattern.
    pub texture: Texture,
    /// Horizontal position (degrees).
    pub x: f64,
    /// Vertical position (degrees).
    pub y: f64,
    /// Horizontal size (degrees).
    pub sx: f64,
    /// Vertical size (degrees).
    pub sy: f64,
    /// Luminance (cd/m^2).
    pub lum: f64,
    /// Primary colour.
    pub color1: Rgb,
    /// Secondary colour for patterned textures.
    pub color2: Rgb,
    /// Shape rotation (degrees).
    pub rotation: f64,
    /// Texture contrast in [0, 1].
    pub contrast: f64,
    /// Spatial phase (degrees).
    pub phase: f64,
    /// Spatial frequency (cycles per degree).
    pub frequency: f64,
    /// Defocus (dioptres).
    pub defocus: f64,
    /// Texture rotation (degrees).
    pub tex_rotation: f64,
    /// Presentation time in ms; 0 chains the stimulus to the next one.
    pub t: f64,
    /// Response window in ms, measured from onset.
    pub w: f64,
    /// Letter shown by the optotype shape.
    pub optotype: Option<String>,
    /// Image file for the image texture.
    pub image_filename: Option<String>,
    /// Whether the stimulus fills the whole field of view.
    pub full_fov: bool,
}

impl Default for Stimulus {
    fn default() -> Self {
        Self {
            eye: Eye::Both,
            shape: Shape::Circle,
            texture: Texture::Flat,
            x: 0.0,
            y: 0.0,
            sx: 0.43,
            sy: 0.43,
            lum: 100.0,
            color1: WHITE,
            color2: WHITE,
            rotation: 0.0,
            contrast: 1.0,
            phase: 0.0,
            frequency: 0.0,
            defocus: 0.0,
            tex_rotation: 0.0,
            t: 200.0,
            w: 1500.0,
            optotype: None,
            image_filename: None,
            full_fov: false,
        }
    }
}

/// Per-stimulus values of one PRESENT field: `n` values, or one value shared
/// by every stimulus.
struct Column<T> {
    values: Vec<T>,
}

impl<T: Clone> Column<T> {
    fn new(name: &str, values: Vec<T>, n: usize) -> OpiResult<Self> {
        if values.len() == n || values.len() == 1 {
            Ok(Self { values })
        } else {
            Err(OpiError::InvalidStimulus(format!(
                "'{name}' has {} values but stim.length is {n}",
                values.len()
            )))
        }
    }

    fn at(&self, index: usize) -> T {
        let index = if self.values.len() == 1 { 0 } else { index };
        self.values[index].clone()
    }
}

fn number_column(args: &Args, name: &str, n: usize, default: f64) -> OpiResult<Column<f64>> {
    let values = args.opt_numbers(name)?.unwrap_or_else(|| vec![default]);
    Column::new(name, values, n)
}

fn parsed_column<T: FromStr<Err = OpiError> + Clone>(
    args: &Args,
    name: &str,
    n: usize,
    default: T,
) -> OpiResult<Column<T>> {
    let values = match args.opt_texts(name)? {
        None => vec![default],
        Some(texts) => texts
            .iter()
            .map(|t| t.parse::<T>())
            .collect::<OpiResult<Vec<T>>>()?,
    };
    Column::new(name, values, n)
}

fn colour_column(args: &Args, name: &str, n: usize) -> OpiResult<Column<Rgb>> {
    let values = match args.opt_numbers(name)? {
        None => vec![WHITE],
        Some(flat) if flat.len() % 3 == 0 => flat.chunks(3).map(|c| [c[0], c[1], c[2]]).collect(),
        Some(flat) => {
            return Err(OpiError::InvalidStimulus(format!(
                "'{name}' must hold RGB triples, got {} values",
                flat.len()
            )))
        }
    };
    Column::new(name, values, n)
}

impl Stimulus {
    /// Assemble the stimulus sequence of a validated PRESENT.
    pub fn sequence_from_args(args: &Args) -> OpiResult<Vec<Stimulus>> {
        let length = args.number("stim.length")?;
        if length < 1.0 || length.fract() != 0.0 {
            return Err(OpiError::InvalidStimulus(format!(
                "stim.length must be a positive integer, got {length}"
            )));
        }
        let n = length as usize;
        let base = Stimulus::default();

        let eye = parsed_column(args, "eye", n, base.eye)?;
        let shape = parsed_column(args, "shape", n, base.shape)?;
        let texture = parsed_column(args, "type", n, base.texture)?;
        let x = number_column(args, "x", n, base.x)?;
        let y = number_column(args, "y", n, base.y)?;
        let sx = number_column(args, "sx", n, base.sx)?;
        let sy = number_column(args, "sy", n, base.sy)?;
        let lum = number_column(args, "lum", n, base.lum)?;
        let color1 = colour_column(args, "color1", n)?;
        let color2 = colour_column(args, "color2", n)?;
        let rotation = number_column(args, "rotation", n, base.rotation)?;
        let contrast = number_column(args, "contrast", n, base.contrast)?;
        let phase = number_column(args, "phase", n, base.phase)?;
        let frequency = number_column(args, "frequency", n, base.frequency)?;
        let defocus = number_column(args, "defocus", n, base.defocus)?;
        let tex_rotation = number_column(args, "texRotation", n, base.tex_rotation)?;
        let t = number_column(args, "t", n, base.t)?;
        let w = number_column(args, "w", n, base.w)?;
        let full_fov = number_column(args, "fullFoV", n, 0.0)?;
        let optotype = args
            .opt_texts("optotype")?
            .map(|v| Column::new("optotype", v, n))
            .transpose()?;
        let image = args
            .opt_texts("imageFilename")?
            .map(|v| Column::new("imageFilename", v, n))
            .transpose()?;

        let stimuli: Vec<Stimulus> = (0..n)
            .map(|i| Stimulus {
                eye: eye.at(i),
                shape: shape.at(i),
                texture: texture.at(i),
                x: x.at(i),
                y: y.at(i),
                sx: sx.at(i),
                sy: sy.at(i),
                lum: lum.at(i),
                color1: color1.at(i),
                color2: color2.at(i),
                rotation: rotation.at(i),
                contrast: contrast.at(i),
                phase: phase.at(i),
                frequency: frequency.at(i),
                defocus: defocus.at(i),
                tex_rotation: tex_rotation.at(i),
                t: t.at(i),
                w: w.at(i),
                optotype: optotype.as_ref().map(|c| c.at(i)),
                image_filename: image.as_ref().map(|c| c.at(i)),
                full_fov: full_fov.at(i) != 0.0,
            })
            .collect();

        validate_sequence(&stimuli)?;
        Ok(stimuli)
    }
}

/// Cross-field checks on a stimulus sequence.
pub fn validate_sequence(stimuli: &[Stimulus]) -> OpiResult<()> {
    let Some(last) = stimuli.last() else {
        return Err(OpiError::InvalidStimulus("empty stimulus sequence".into()));
    };
    if last.t > last.w {
        return Err(OpiError::InvalidStimulus(format!(
            "presentation time {} ms is longer than the response window {} ms",
            last.t, last.w
        )));
    }
    for (index, stimulus) in stimuli.iter().enumerate() {
        if stimulus.texture == Texture::Image && stimulus.image_filename.is_none() {
            return Err(OpiError::InvalidStimulus(format!(
                "stimulus {index} has an image texture but no imageFilename"
            )));
        }
        if stimulus.shape == Shape::Optotype && stimulus.optotype.is_none() {
            return Err(OpiError::InvalidStimulus(format!(
                "stimulus {index} is an optotype but no optotype letter was given"
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Groups
// =============================================================================

/// Stimuli shown together: a run of entries with `t == 0` plus the entry
/// that ends it.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Indices into the stimulus sequence.
    pub members: Range<usize>,
    /// How long the group stays on screen (ms).
    pub duration: f64,
    /// Response window of the group's last stimulus (ms).
    pub window: f64,
    /// Eye to sample while the group is shown.
    pub eye: Eye,
}

/// Split a sequence into display groups.
pub fn build_groups(stimuli: &[Stimulus]) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (index, stimulus) in stimuli.iter().enumerate() {
        let is_last = index + 1 == stimuli.len();
        if stimulus.t > 0.0 || is_last {
            let members = start..index + 1;
            groups.push(Group {
                eye: common_eye(&stimuli[members.clone()]),
                duration: stimulus.t,
                window: stimulus.w,
                members,
            });
            start = index + 1;
        }
    }
    groups
}

fn common_eye(stimuli: &[Stimulus]) -> Eye {
    match stimuli.split_first() {
        Some((first, rest)) if rest.iter().all(|s| s.eye == first.eye) => first.eye,
        _ => Eye::Both,
    }
}

// =============================================================================
// Background
// =============================================================================

/// Background and fixation target set by SETUP.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    /// Eye(s) the settings apply to.
    pub eye: Eye,
    /// Background luminance (cd/m^2).
    pub bg_lum: f64,
    /// Background colour.
    pub bg_col: Rgb,
    /// Fixation outline.
    pub fix_shape: Shape,
    /// Fixation texture.
    pub fix_type: Texture,
    /// Fixation centre x (degrees).
    pub fix_cx: f64,
    /// Fixation centre y (degrees).
    pub fix_cy: f64,
    /// Fixation width (degrees).
    pub fix_sx: f64,
    /// Fixation height (degrees).
    pub fix_sy: f64,
    /// Fixation rotation (degrees).
    pub fix_rotation: f64,
    /// Fixation luminance (cd/m^2).
    pub fix_lum: f64,
    /// Fixation colour.
    pub fix_col: Rgb,
    /// Whether stimuli follow the tracked eye position.
    pub tracking: bool,
    /// Optional background image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_image_filename: Option<String>,
    /// Optional fixation image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_image_filename: Option<String>,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            eye: Eye::Both,
            bg_lum: 10.0,
            bg_col: WHITE,
            fix_shape: Shape::Maltese,
            fix_type: Texture::Flat,
            fix_cx: 0.0,
            fix_cy: 0.0,
            fix_sx: 1.0,
            fix_sy: 1.0,
            fix_rotation: 0.0,
            fix_lum: 20.0,
            fix_col: [0.0, 1.0, 0.0],
            tracking: false,
            bg_image_filename: None,
            fix_image_filename: None,
        }
    }
}

fn rgb(args: &Args, name: &str, default: Rgb) -> OpiResult<Rgb> {
    match args.opt_numbers(name)? {
        None => Ok(default),
        Some(v) if v.len() == 3 => Ok([v[0], v[1], v[2]]),
        Some(v) => Err(OpiError::InvalidStimulus(format!(
            "'{name}' must be an RGB triple, got {} values",
            v.len()
        ))),
    }
}

impl Background {
    /// Read a validated SETUP.
    pub fn from_args(args: &Args) -> OpiResult<Self> {
        let base = Background::default();
        let parse = |name: &str| -> OpiResult<Option<String>> { args.opt_text(name) };
        Ok(Self {
            eye: parse("eye")?
                .map(|e| e.parse::<Eye>())
                .transpose()?
                .unwrap_or(base.eye),
            bg_lum: args.opt_number("bgLum")?.unwrap_or(base.bg_lum),
            bg_col: rgb(args, "bgCol", base.bg_col)?,
            fix_shape: parse("fixShape")?
                .map(|s| s.parse::<Shape>())
                .transpose()?
                .unwrap_or(base.fix_shape),
            fix_type: parse("fixType")?
                .map(|s| s.parse::<Texture>())
                .transpose()?
                .unwrap_or(base.fix_type),
            fix_cx: args.opt_number("fixCx")?.unwrap_or(base.fix_cx),
            fix_cy: args.opt_number("fixCy")?.unwrap_or(base.fix_cy),
            fix_sx: args.opt_number("fixSx")?.unwrap_or(base.fix_sx),
            fix_sy: args.opt_number("fixSy")?.unwrap_or(base.fix_sy),
            fix_rotation: args.opt_number("fixRotation")?.unwrap_or(base.fix_rotation),
            fix_lum: args.opt_number("fixLum")?.unwrap_or(base.fix_lum),
            fix_col: rgb(args, "fixCol", base.fix_col)?,
            tracking: args.opt_number("tracking")?.map_or(base.tracking, |v| v != 0.0),
            bg_image_filename: parse("bgImageFilename")?,
            fix_image_filename: parse("fixImageFilename")?,
        })
    }
}

// =============================================================================
// Result
// =============================================================================

/// Eye position reported with a presentation result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeSample {
    /// Horizontal position (degrees).
    pub x: f64,
    /// Vertical position (degrees).
    pub y: f64,
    /// Pupil diameter (mm).
    pub diameter: f64,
    /// Acquisition time relative to stimulus onset (ms).
    pub time: i64,
}

impl EyeSample {
    /// Sample relative to the onset at `onset_ms`.
    pub fn relative_to(response: &SampleResponse, onset_ms: u64) -> Self {
        Self {
            x: response.x,
            y: response.y,
            diameter: response.diameter,
            time: response.acquisition_timestamp as i64 - onset_ms as i64,
        }
    }
}

/// Outcome of one PRESENT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentResult {
    /// Whether the subject responded inside the window.
    pub seen: bool,
    /// Reaction time (ms from onset); the full window when unseen.
    pub time: u64,
    /// Eye position at onset.
    pub start: Option<EyeSample>,
    /// Eye position at the response.
    pub end: Option<EyeSample>,
}

impl PresentResult {
    /// Reply payload. Eye fields are omitted when no sample arrived.
    pub fn to_json(&self) -> Value {
        let mut msg = Map::new();
        msg.insert("seen".into(), Value::from(self.seen));
        msg.insert("time".into(), Value::from(self.time));
        for (suffix, sample) in [("Start", self.start), ("End", self.end)] {
            if let Some(s) = sample {
                msg.insert(format!("eyex{suffix}"), Value::from(s.x));
                msg.insert(format!("eyey{suffix}"), Value::from(s.y));
                msg.insert(format!("eyed{suffix}"), Value::from(s.diameter));
                msg.insert(format!("eyet{suffix}"), Value::from(s.time));
            }
        }
        Value::Object(msg)
    }
}
