//! Display device backed by the presentation engine.
//!
//! Handlers translate validated arguments into engine actions through an
//! [`EngineHandle`]. The engine itself runs on the update loop, so PRESENT
//! simply awaits the result the engine builds.

use crate::config::DisplayConfig;
use crate::error::OpiResult;
use crate::instrument::Device;
use crate::parameter::{CommandTable, ParameterSpec};
use crate::presentation::{Background, EngineHandle, Eye, Shape, Stimulus, Texture};
use crate::protocol::{Args, Packet};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

const MAX_LUM: f64 = 3183.099;
const OPTOTYPES: &[&str] = &[
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r",
    "s", "t", "u", "v", "w", "x", "y", "z",
];

const DISPLAY_SETUP: &[ParameterSpec] = &[
    ParameterSpec::choice("eye", Eye::NAMES).describe("Eye the settings apply to."),
    ParameterSpec::number("bgLum", 0.0, MAX_LUM).describe("Background luminance (cd/m^2)."),
    ParameterSpec::number_list("bgCol", 0.0, 1.0)
        .optional()
        .describe("Background colour as RGB in [0, 1]."),
    ParameterSpec::choice("fixShape", Shape::NAMES)
        .optional()
        .describe("Fixation target shape."),
    ParameterSpec::choice("fixType", Texture::NAMES)
        .optional()
        .describe("Fixation target texture."),
    ParameterSpec::number("fixCx", -90.0, 90.0)
        .optional()
        .describe("x-coordinate of fixation target (degrees)."),
    ParameterSpec::number("fixCy", -90.0, 90.0)
        .optional()
        .describe("y-coordinate of fixation target (degrees)."),
    ParameterSpec::number("fixSx", 0.0, 180.0)
        .optional()
        .describe("Fixation target width (degrees)."),
    ParameterSpec::number("fixSy", 0.0, 180.0)
        .optional()
        .describe("Fixation target height (degrees)."),
    ParameterSpec::number("fixRotation", 0.0, 360.0)
        .optional()
        .describe("Fixation target rotation (degrees)."),
    ParameterSpec::number("fixLum", 0.0, MAX_LUM)
        .optional()
        .describe("Fixation target luminance (cd/m^2)."),
    ParameterSpec::number_list("fixCol", 0.0, 1.0)
        .optional()
        .describe("Fixation colour as RGB in [0, 1]."),
    ParameterSpec::number("tracking", 0.0, 1.0)
        .optional()
        .describe("Whether to correct stimulus location based on eye position."),
    ParameterSpec::text("bgImageFilename")
        .optional()
        .describe("Background image file."),
    ParameterSpec::text("fixImageFilename")
        .optional()
        .describe("Fixation image file."),
];

const DISPLAY_PRESENT: &[ParameterSpec] = &[
    ParameterSpec::number("stim.length", 1.0, 100.0).describe("Number of stimuli."),
    ParameterSpec::number_list("t", 0.0, 60_000.0)
        .describe("Presentation times (ms); 0 shows the stimulus together with the next."),
    ParameterSpec::number_list("w", 0.0, 60_000.0)
        .describe("Response windows (ms), measured from onset."),
    ParameterSpec::choice_list("eye", Eye::NAMES)
        .optional()
        .describe("Eye each stimulus is shown to."),
    ParameterSpec::choice_list("shape", Shape::NAMES)
        .optional()
        .describe("Stimulus shapes."),
    ParameterSpec::choice_list("type", Texture::NAMES)
        .optional()
        .describe("Stimulus textures."),
    ParameterSpec::number_list("x", -90.0, 90.0)
        .optional()
        .describe("x co-ordinates of stimuli (degrees)."),
    ParameterSpec::number_list("y", -90.0, 90.0)
        .optional()
        .describe("y co-ordinates of stimuli (degrees)."),
    ParameterSpec::number_list("sx", 0.0, 180.0)
        .optional()
        .describe("Stimulus widths (degrees)."),
    ParameterSpec::number_list("sy", 0.0, 180.0)
        .optional()
        .describe("Stimulus heights (degrees)."),
    ParameterSpec::number_list("lum", 0.0, MAX_LUM)
        .optional()
        .describe("Stimulus luminances (cd/m^2)."),
    ParameterSpec::number_list("color1", 0.0, 1.0)
        .optional()
        .describe("Primary colours as RGB triples."),
    ParameterSpec::number_list("color2", 0.0, 1.0)
        .optional()
        .describe("Secondary colours as RGB triples."),
    ParameterSpec::number_list("rotation", 0.0, 360.0)
        .optional()
        .describe("Stimulus rotations (degrees)."),
    ParameterSpec::number_list("contrast", 0.0, 1.0)
        .optional()
        .describe("Texture contrasts."),
    ParameterSpec::number_list("phase", 0.0, 360.0)
        .optional()
        .describe("Spatial phases (degrees)."),
    ParameterSpec::number_list("frequency", 0.0, 300.0)
        .optional()
        .describe("Spatial frequencies (cycles per degree)."),
    ParameterSpec::number_list("defocus", -20.0, 20.0)
        .optional()
        .describe("Defocus (dioptres)."),
    ParameterSpec::number_list("texRotation", 0.0, 360.0)
        .optional()
        .describe("Texture rotations (degrees)."),
    ParameterSpec::choice_list("optotype", OPTOTYPES)
        .optional()
        .describe("Optotype letters for optotype shapes."),
    ParameterSpec::text_list("imageFilename")
        .optional()
        .describe("Image files for image textures."),
    ParameterSpec::number_list("fullFoV", 0.0, 1.0)
        .optional()
        .describe("Whether each stimulus fills the field of view."),
];

static DISPLAY_COMMANDS: CommandTable = CommandTable {
    setup: DISPLAY_SETUP,
    present: DISPLAY_PRESENT,
    ..CommandTable::EMPTY
};

/// Screen-based perimeter driven by the presentation engine.
pub struct Display {
    engine: EngineHandle,
    settings: DisplayConfig,
    initialized: bool,
    shown: bool,
}

impl Display {
    /// Device driving `engine`, describing itself with `settings`.
    pub fn new(engine: EngineHandle, settings: DisplayConfig) -> Self {
        Self {
            engine,
            settings,
            initialized: false,
            shown: false,
        }
    }

    fn describe(&self) -> Value {
        let mut msg = serde_json::to_value(&self.settings).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut msg {
            map.insert("machine".into(), json!(self.name()));
            map.insert("initialized".into(), json!(self.initialized));
            map.insert("state".into(), json!(self.engine.state().to_string()));
            map.insert("parameters".into(), DISPLAY_COMMANDS.describe_json());
        }
        msg
    }
}

#[async_trait]
impl Device for Display {
    fn name(&self) -> &str {
        "display"
    }

    fn commands(&self) -> &'static CommandTable {
        &DISPLAY_COMMANDS
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    async fn query(&mut self) -> OpiResult<Packet> {
        Ok(Packet::ok(self.describe()))
    }

    async fn initialize(&mut self, _args: &Args) -> OpiResult<Packet> {
        if !self.shown {
            self.engine.show().await?;
            self.shown = true;
        }
        self.initialized = true;
        info!("Display initialized");
        Ok(Packet::ok(self.describe()))
    }

    async fn setup(&mut self, args: &Args) -> OpiResult<Packet> {
        let background = Background::from_args(args)?;
        let echo = serde_json::to_value(&background).unwrap_or(Value::Null);
        self.engine.setup(background).await?;
        Ok(Packet::ok(echo))
    }

    async fn present(&mut self, args: &Args) -> OpiResult<Packet> {
        let stimuli = Stimulus::sequence_from_args(args)?;
        debug!(stimuli = stimuli.len(), "Presenting");
        let result = self.engine.present(stimuli).await?;
        Ok(Packet::ok(result.to_json()))
    }

    async fn close(&mut self) -> OpiResult<Packet> {
        self.engine.close().await?;
        self.initialized = false;
        self.shown = false;
        info!("Display closed");
        Ok(Packet::ok_close("Display closed"))
    }

    fn interrupt(&self) {
        self.engine.interrupt();
    }
}
