//! Centralized remote endpoint configuration.
//!
//! Production URLs live here as constants; [`Endpoints`] bundles them so a
//! session (or a test against mock servers) can override any subset.

pub const VERSION_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest_v2.json";
pub const FABRIC_META_URL: &str = "https://meta.fabricmc.net/v2/versions/loader";
pub const FORGE_MAVEN_URL: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge";
pub const FORGE_PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";
pub const ASSET_OBJECTS_URL: &str = "https://resources.download.minecraft.net";
pub const MODRINTH_API_URL: &str = "https://api.modrinth.com/v2";
pub const CURSEFORGE_API_URL: &str = "https://api.curseforge.com/v1";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub version_manifest: String,
    pub fabric_meta: String,
    pub forge_maven: String,
    pub forge_promotions: String,
    pub asset_objects: String,
    pub modrinth: String,
    pub curseforge: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: VERSION_MANIFEST_URL.to_string(),
            fabric_meta: FABRIC_META_URL.to_string(),
            forge_maven: FORGE_MAVEN_URL.to_string(),
            forge_promotions: FORGE_PROMOTIONS_URL.to_string(),
            asset_objects: ASSET_OBJECTS_URL.to_string(),
            modrinth: MODRINTH_API_URL.to_string(),
            curseforge: CURSEFORGE_API_URL.to_string(),
        }
    }
}
