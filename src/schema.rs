//! The 5-dimension verdict contract and its validator.
//!
//! Provider output is untrusted until it passes [`validate`]; nothing
//! downstream touches the payload before then. Enum wire values match the
//! provider contract exactly; no coercion of out-of-domain values.
//! Extra fields the provider adds are preserved in the stored payload
//! (the raw JSON is persisted, not this typed model) but never required.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

// ============================================================================
// Dimension 1: visual grounding
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualGrounding {
    /// 3-5 main visual elements, listed before any interpretation.
    pub detected_entities: Vec<String>,
    pub setting: String,
    #[serde(default)]
    pub text_on_screen: Option<String>,
}

// ============================================================================
// Dimension 2: content taxonomy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoFormat {
    #[serde(rename = "Standard_Landscape")]
    StandardLandscape,
    #[serde(rename = "Short_Vertical")]
    ShortVertical,
    #[serde(rename = "Livestream_VOD")]
    LivestreamVod,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationPerceived {
    #[serde(rename = "Micro (<1 min)")]
    Micro,
    #[serde(rename = "Short (1-5 min)")]
    Short,
    #[serde(rename = "Medium (5-20 min)")]
    Medium,
    #[serde(rename = "Long (20+ min)")]
    Long,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub format: VideoFormat,
    pub duration_perceived: DurationPerceived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryGenre {
    #[serde(rename = "Gaming_Gameplay")]
    GamingGameplay,
    #[serde(rename = "Gaming_Culture")]
    GamingCulture,
    #[serde(rename = "Animation_Storytime")]
    AnimationStorytime,
    #[serde(rename = "Animation_ContentFarm")]
    AnimationContentFarm,
    #[serde(rename = "Toys_Unboxing")]
    ToysUnboxing,
    #[serde(rename = "Pranks_Challenges")]
    PranksChallenges,
    #[serde(rename = "Education_STEM")]
    EducationStem,
    #[serde(rename = "Education_Humanities")]
    EducationHumanities,
    #[serde(rename = "Mascot_Horror")]
    MascotHorror,
    #[serde(rename = "Internet_Culture")]
    InternetCulture,
    #[serde(rename = "Vlog_Lifestyle")]
    VlogLifestyle,
    #[serde(rename = "Music_Dance")]
    MusicDance,
    #[serde(rename = "Pseudoscience_Conspiracy")]
    PseudoscienceConspiracy,
    Other,
}

impl PrimaryGenre {
    /// The wire value, used for the denormalized `primary_genre` index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GamingGameplay => "Gaming_Gameplay",
            Self::GamingCulture => "Gaming_Culture",
            Self::AnimationStorytime => "Animation_Storytime",
            Self::AnimationContentFarm => "Animation_ContentFarm",
            Self::ToysUnboxing => "Toys_Unboxing",
            Self::PranksChallenges => "Pranks_Challenges",
            Self::EducationStem => "Education_STEM",
            Self::EducationHumanities => "Education_Humanities",
            Self::MascotHorror => "Mascot_Horror",
            Self::InternetCulture => "Internet_Culture",
            Self::VlogLifestyle => "Vlog_Lifestyle",
            Self::MusicDance => "Music_Dance",
            Self::PseudoscienceConspiracy => "Pseudoscience_Conspiracy",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetDemographic {
    #[serde(rename = "Toddler (0-4)")]
    Toddler,
    #[serde(rename = "Child (5-9)")]
    Child,
    #[serde(rename = "Pre-Teen (10-12)")]
    PreTeen,
    #[serde(rename = "Teen (13+)")]
    Teen,
    Adult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTaxonomy {
    pub primary_genre: PrimaryGenre,
    pub specific_topic: String,
    pub target_demographic: TargetDemographic,
}

// ============================================================================
// Dimension 3: narrative quality
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralIntegrity {
    #[serde(rename = "Coherent_Narrative")]
    CoherentNarrative,
    #[serde(rename = "Loose_Vlog_Style")]
    LooseVlogStyle,
    #[serde(rename = "Compilation_Clips")]
    CompilationClips,
    #[serde(rename = "Incoherent_Chaos")]
    IncoherentChaos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreativeIntent {
    #[serde(rename = "Artistic/Creative")]
    ArtisticCreative,
    Informational,
    #[serde(rename = "Parasocial/Vlog")]
    ParasocialVlog,
    #[serde(rename = "Algorithmic/Slop")]
    AlgorithmicSlop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeirdnessVerdict {
    Normal,
    #[serde(rename = "Creative_Surrealism")]
    CreativeSurrealism,
    #[serde(rename = "Disturbing_Uncanny")]
    DisturbingUncanny,
    #[serde(rename = "Lazy_Randomness")]
    LazyRandomness,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeQuality {
    /// Coherent has a clear start/end; Incoherent is random noise.
    pub structural_integrity: StructuralIntegrity,
    pub creative_intent: CreativeIntent,
    /// Distinguishes high-effort weirdness from low-effort noise.
    pub weirdness_verdict: WeirdnessVerdict,
}

// ============================================================================
// Dimension 4: cognitive nutrition
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntellectualDensity {
    #[serde(rename = "Void (Mindless)")]
    Void,
    #[serde(rename = "Low (Trivia)")]
    Low,
    #[serde(rename = "Medium (Story/Hobby)")]
    Medium,
    #[serde(rename = "High (Educational)")]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmotionalVolatility {
    Calm,
    Upbeat,
    #[serde(rename = "High_Stress")]
    HighStress,
    #[serde(rename = "Aggressive_Screaming")]
    AggressiveScreaming,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveNutrition {
    pub intellectual_density: IntellectualDensity,
    pub emotional_volatility: EmotionalVolatility,
    /// Rapid-fire editing, sensory overload, retention hacking.
    pub is_brainrot: bool,
    /// Low-effort, soul-less production.
    pub is_slop: bool,
}

// ============================================================================
// Dimension 5: risk assessment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlags {
    pub ideological_radicalization: bool,
    pub pseudoscience_misinfo: bool,
    pub body_image_harm: bool,
    pub dangerous_behavior: bool,
    pub commercial_exploitation: bool,
    pub lootbox_gambling: bool,
    pub sexual_themes: bool,
    pub mascot_horror: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0-100 integer; range-checked by the validator.
    pub safety_score: i64,
    pub flags: RiskFlags,
}

// ============================================================================
// Summary & verdict
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionVerdict {
    Approve,
    Monitor,
    #[serde(rename = "Block_Video")]
    BlockVideo,
    #[serde(rename = "Block_Channel")]
    BlockChannel,
}

impl ActionVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "Approve",
            Self::Monitor => "Monitor",
            Self::BlockVideo => "Block_Video",
            Self::BlockChannel => "Block_Channel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub action: ActionVerdict,
    pub reason: String,
}

/// The full validated analysis for one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub visual_grounding: VisualGrounding,
    pub video_metadata: VideoMetadata,
    pub content_taxonomy: ContentTaxonomy,
    pub narrative_quality: NarrativeQuality,
    pub cognitive_nutrition: CognitiveNutrition,
    pub risk_assessment: RiskAssessment,
    pub summary: String,
    pub verdict: Verdict,
}

const REQUIRED_SECTIONS: [&str; 8] = [
    "visual_grounding",
    "video_metadata",
    "content_taxonomy",
    "narrative_quality",
    "cognitive_nutrition",
    "risk_assessment",
    "summary",
    "verdict",
];

fn violation(field: &str, reason: impl ToString) -> AppError {
    AppError::SchemaViolation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn section<T: serde::de::DeserializeOwned>(value: &Value, field: &str) -> Result<T, AppError> {
    let v = value
        .get(field)
        .ok_or_else(|| violation(field, "missing required field"))?;
    serde_json::from_value(v.clone()).map_err(|e| violation(field, e))
}

/// Validate raw provider output against the 5-dimension contract.
///
/// Fails with `SchemaViolation { field, reason }` on a missing section,
/// an out-of-domain enum value, an out-of-range `safety_score`, or a
/// non-object top level. Validation never mutates the input.
pub fn validate(value: &Value) -> Result<VideoAnalysis, AppError> {
    if !value.is_object() {
        return Err(violation("$", "top-level value is not a JSON object"));
    }

    // Report the first missing section by name before descending into any
    // of them, so the error points at the contract rather than serde.
    for field in REQUIRED_SECTIONS {
        if value.get(field).is_none() {
            return Err(violation(field, "missing required field"));
        }
    }

    let analysis = VideoAnalysis {
        visual_grounding: section(value, "visual_grounding")?,
        video_metadata: section(value, "video_metadata")?,
        content_taxonomy: section(value, "content_taxonomy")?,
        narrative_quality: section(value, "narrative_quality")?,
        cognitive_nutrition: section(value, "cognitive_nutrition")?,
        risk_assessment: section(value, "risk_assessment")?,
        summary: section(value, "summary")?,
        verdict: section(value, "verdict")?,
    };

    let score = analysis.risk_assessment.safety_score;
    if !(0..=100).contains(&score) {
        return Err(violation(
            "risk_assessment.safety_score",
            format!("value {} outside [0, 100]", score),
        ));
    }

    Ok(analysis)
}

#[cfg(test)]
pub(crate) fn sample_verdict_json() -> Value {
    serde_json::json!({
        "visual_grounding": {
            "detected_entities": ["Teacher", "Whiteboard", "Robot Kit"],
            "setting": "Classroom",
            "text_on_screen": "Robotics 101"
        },
        "video_metadata": {
            "format": "Standard_Landscape",
            "duration_perceived": "Medium (5-20 min)"
        },
        "content_taxonomy": {
            "primary_genre": "Education_STEM",
            "specific_topic": "Robotics",
            "target_demographic": "Child (5-9)"
        },
        "narrative_quality": {
            "structural_integrity": "Coherent_Narrative",
            "creative_intent": "Informational",
            "weirdness_verdict": "Normal"
        },
        "cognitive_nutrition": {
            "intellectual_density": "High (Educational)",
            "emotional_volatility": "Calm",
            "is_brainrot": false,
            "is_slop": false
        },
        "risk_assessment": {
            "safety_score": 95,
            "flags": {
                "ideological_radicalization": false,
                "pseudoscience_misinfo": false,
                "body_image_harm": false,
                "dangerous_behavior": false,
                "commercial_exploitation": false,
                "lootbox_gambling": false,
                "sexual_themes": false,
                "mascot_horror": false
            }
        },
        "summary": "A teacher walks through a robot build with no tricks.",
        "verdict": {
            "action": "Approve",
            "reason": "Safe educational content."
        }
    })
}
