//! Match file handed to the runtime bridge.

use std::path::{Path, PathBuf};

use anyhow::Context;
use matchlink_protocol::{DEFAULT_DIFFICULTY, MatchConfig};
use serde::Serialize;

pub const MATCH_FILE_NAME: &str = "match.toml";

/// Opponent skill per difficulty tier, from 0.0 (bronze) to 1.0 (ssl).
pub const SKILL_MAP: [(&str, f64); 8] = [
    ("bronze", 0.0),
    ("silver", 0.2),
    ("gold", 0.4),
    ("platinum", 0.55),
    ("diamond", 0.7),
    ("champion", 0.85),
    ("grand_champion", 0.95),
    ("ssl", 1.0),
];

/// Unknown tiers play at gold level.
pub fn skill_for(difficulty: &str) -> f64 {
    let lookup = |tier: &str| {
        SKILL_MAP
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(tier))
            .map(|(_, skill)| *skill)
    };
    lookup(difficulty)
        .or_else(|| lookup(DEFAULT_DIFFICULTY))
        .unwrap_or(0.4)
}

#[derive(Serialize)]
struct MatchFile {
    rlbot: LauncherSection,
    #[serde(rename = "match")]
    game: GameSection,
    cars: Vec<CarEntry>,
}

#[derive(Serialize)]
struct LauncherSection {
    launcher: &'static str,
    auto_start_bots: bool,
}

#[derive(Serialize)]
struct GameSection {
    game_mode: &'static str,
    game_map: &'static str,
    skip_replays: bool,
    instant_start: bool,
    enable_rendering: bool,
}

#[derive(Serialize)]
struct CarEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    toml: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    team: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill: Option<f64>,
    name: String,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Renders the match file. With `custom_bot`, the trained bot replaces the
/// built-in opponent and the difficulty tier is ignored.
pub fn render_match_file(config: &MatchConfig, custom_bot: Option<&Path>) -> anyhow::Result<String> {
    let opponent = match custom_bot {
        Some(bot) => CarEntry {
            toml: Some(bot.to_string_lossy().replace('\\', "/")),
            kind: None,
            team: 0,
            skill: None,
            name: "Matchlink Bot".to_string(),
        },
        None => CarEntry {
            toml: None,
            kind: Some("psyonix"),
            team: 0,
            skill: Some(skill_for(&config.difficulty)),
            name: format!("Bot ({})", capitalize(&config.difficulty)),
        },
    };

    let file = MatchFile {
        rlbot: LauncherSection {
            launcher: "epic",
            auto_start_bots: true,
        },
        game: GameSection {
            game_mode: "Soccer",
            game_map: "DFH_Stadium_P",
            skip_replays: true,
            instant_start: true,
            enable_rendering: true,
        },
        cars: vec![
            opponent,
            CarEntry {
                toml: None,
                kind: Some("human"),
                team: 1,
                skill: None,
                name: "Player".to_string(),
            },
        ],
    };

    toml::to_string(&file).context("render match file")
}

pub fn write_match_file(
    dir: &Path,
    config: &MatchConfig,
    custom_bot: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create match dir {}", dir.display()))?;
    let path = dir.join(MATCH_FILE_NAME);
    std::fs::write(&path, render_match_file(config, custom_bot)?)
        .with_context(|| format!("write match file {}", path.display()))?;
    Ok(path)
}
