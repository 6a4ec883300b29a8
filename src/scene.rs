// Per-map scene configuration for the 3D viewer.

use serde::Serialize;

/// Path prefix GLB assets are served under.
pub const MODELS_PREFIX: &str = "/models";

/// Map rendered when a name is not recognised.
pub const FALLBACK_MAP: &str = "knight";

/// Selectable maps with their display labels.
pub const MAPS: [(&str, &str); 4] = [
    ("knight", "Knight's Battlefield"),
    ("cave", "Watcher's Cave"),
    ("castle", "Castle"),
    ("medieval_town_two", "Medieval Town"),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    /// 0xRRGGBB
    pub color: u32,
    pub intensity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<[f32; 3]>,
}

impl Light {
    const fn ambient(color: u32, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            pos: None,
        }
    }

    const fn at(color: u32, intensity: f32, pos: [f32; 3]) -> Self {
        Self {
            color,
            intensity,
            pos: Some(pos),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSettings {
    pub map: &'static str,
    pub camera_pos: Vec3,
    pub ambient: Light,
    pub sun: Light,
    pub extra_point_lights: Vec<Light>,
    pub sky: Light,
    pub ground: Light,
    pub tone_mapping_exposure: f32,
    /// Top and bottom CSS colours of the background.
    pub bg_gradient: [&'static str; 2],
    pub model_path: &'static str,
    pub model_scale: f32,
}

impl SceneSettings {
    /// Settings for a known map.
    pub fn for_map(name: &str) -> Option<Self> {
        let settings = match name {
            "knight" => Self {
                map: "knight",
                camera_pos: Vec3 {
                    x: -5.16,
                    y: 1.14,
                    z: 9.6,
                },
                ambient: Light::ambient(0xffd4a3, 0.4),
                sun: Light::at(0xff7e47, 1.2, [-1.0, 0.5, -1.0]),
                extra_point_lights: vec![Light::at(0xffaa33, 1.0, [0.0, 5.0, 0.0])],
                sky: Light::at(0x5b8dff, 0.4, [1.0, 1.0, 1.0]),
                ground: Light::at(0xff9666, 0.3, [0.0, -1.0, 0.0]),
                tone_mapping_exposure: 0.8,
                bg_gradient: ["#ff7e47", "#2c1810"],
                model_path: "/models/knightbattle.glb",
                model_scale: 1.0,
            },
            "cave" => Self {
                map: "cave",
                camera_pos: Vec3 {
                    x: 10.0,
                    y: 70.0,
                    z: 20.0,
                },
                model_path: "/models/watcher_cave.glb",
                model_scale: 0.1,
                ..Self::golden_daylight("cave")
            },
            "castle" => Self {
                map: "castle",
                camera_pos: Vec3 {
                    x: -0.96,
                    y: 10.0,
                    z: 21.37,
                },
                model_path: "/models/low_poly_castle.glb",
                model_scale: 1.0,
                ..Self::golden_daylight("castle")
            },
            "medieval_town_two" => Self {
                map: "medieval_town_two",
                camera_pos: Vec3 {
                    x: -1.23,
                    y: 12.83,
                    z: 21.41,
                },
                ambient: Light::ambient(0xf8dcb8, 0.45),
                sun: Light::at(0xffd08a, 1.1, [-1.0, 0.6, -0.3]),
                extra_point_lights: vec![Light::at(0xffaa33, 1.0, [0.0, 5.0, 0.0])],
                sky: Light::at(0x87ceeb, 0.5, [0.5, 1.0, 0.8]),
                ground: Light::at(0xffbb88, 0.3, [0.0, -1.0, 0.0]),
                tone_mapping_exposure: 0.9,
                bg_gradient: ["#ffe5b4", "#c98c56"],
                model_path: "/models/medieval_town_two.glb",
                model_scale: 1.2,
            },
            _ => return None,
        };
        Some(settings)
    }

    /// Settings for any name, falling back to the knight map.
    pub fn for_map_or_default(name: &str) -> Self {
        Self::for_map(name)
            .or_else(|| Self::for_map(FALLBACK_MAP))
            .unwrap_or_else(|| Self::golden_daylight(FALLBACK_MAP))
    }

    // Shared by the cave and the castle.
    fn golden_daylight(map: &'static str) -> Self {
        Self {
            map,
            camera_pos: Vec3 {
                x: 0.0,
                y: 10.0,
                z: 20.0,
            },
            ambient: Light::ambient(0xffffff, 0.5),
            sun: Light::at(0xfff4c2, 1.0, [1.0, 1.0, 0.5]),
            extra_point_lights: vec![Light::at(0xffaa33, 100.0, [0.0, 5.0, 0.0])],
            sky: Light::at(0x99ccff, 0.5, [0.0, 1.0, 1.0]),
            ground: Light::at(0xffe0b2, 0.4, [0.0, -1.0, 0.0]),
            tone_mapping_exposure: 1.0,
            bg_gradient: ["#e0c97f", "#b0975a"],
            model_path: "/models/medieval_town_two.glb",
            model_scale: 1.0,
        }
    }
}

/// Display label for a selectable map.
pub fn map_label(name: &str) -> Option<&'static str> {
    MAPS.iter()
        .find(|(id, _)| *id == name)
        .map(|(_, label)| *label)
}

pub fn map_names() -> Vec<&'static str> {
    MAPS.iter().map(|(id, _)| *id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_map_has_settings() {
        for name in map_names() {
            let settings = SceneSettings::for_map(name).unwrap();
            assert_eq!(settings.map, name);
            assert!(settings.model_path.starts_with(MODELS_PREFIX));
            assert!(settings.model_path.ends_with(".glb"));
        }
    }

    #[test]
    fn test_unknown_map_falls_back_to_knight() {
        assert!(SceneSettings::for_map("moon").is_none());
        let settings = SceneSettings::for_map_or_default("moon");
        assert_eq!(settings.map, "knight");
        assert_eq!(settings.bg_gradient, ["#ff7e47", "#2c1810"]);
    }

    #[test]
    fn test_cave_is_scaled_down() {
        let cave = SceneSettings::for_map("cave").unwrap();
        assert_eq!(cave.model_scale, 0.1);
        assert_eq!(cave.extra_point_lights[0].intensity, 100.0);
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(SceneSettings::for_map("castle").unwrap()).unwrap();
        assert_eq!(value["toneMappingExposure"], 1.0);
        assert_eq!(value["cameraPos"]["z"].as_f64().unwrap() as f32, 21.37);
        assert!(value["ambient"].get("pos").is_none());
    }

    #[test]
    fn test_map_labels() {
        assert_eq!(map_label("cave"), Some("Watcher's Cave"));
        assert_eq!(map_label("moon"), None);
    }
}
