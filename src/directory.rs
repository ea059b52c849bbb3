use std::collections::HashSet;

use log::warn;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::builder::escape_html;
use crate::colour::{self, ColourError};
use crate::plugin_api::{FormSchema, PluginDescriptor};

/// What a render target needs to draw one plugin tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub label: String,
    pub name: String,
    pub version: String,
    /// Background colour as `#rrggbb`
    pub display_colour: String,
    pub text_colour: &'static str,
}

/// Latest snapshot of plugin handshakes, sorted for display
#[derive(Debug, Clone)]
pub struct HandshakeDirectory {
    descriptors: Vec<PluginDescriptor>,
    fallback_colour: String,
}

impl HandshakeDirectory {
    pub fn new(fallback_colour: &str) -> Self {
        Self {
            descriptors: Vec::new(),
            fallback_colour: fallback_colour.to_string(),
        }
    }

    /// Replace the snapshot with a fresh handshake set.
    ///
    /// Duplicate `(name, version)` pairs keep their first occurrence. The
    /// order is a stable sort on `collation_key`.
    pub fn replace(&mut self, descriptors: Vec<PluginDescriptor>) {
        let mut seen = HashSet::new();
        let mut unique: Vec<PluginDescriptor> = descriptors
            .into_iter()
            .filter(|d| seen.insert((d.name.clone(), d.version.clone())))
            .collect();

        unique.sort_by_cached_key(|d| collation_key(&d.name));
        self.descriptors = unique;
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn find(&self, name: &str, version: &str) -> Option<&PluginDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.name == name && d.version == version)
    }

    /// Descriptors that can act as the given component kind
    pub fn for_component<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a PluginDescriptor> + 'a {
        self.descriptors
            .iter()
            .filter(move |d| d.kinds.iter().any(|k| k == kind))
    }

    /// The persistent settings schema a plugin advertised in its handshake
    pub fn persistent_settings(
        &self,
        name: &str,
        version: &str,
    ) -> Option<Result<FormSchema, serde_json::Error>> {
        let descriptor = self.find(name, version)?;
        if descriptor.settings.is_empty() {
            return None;
        }
        Some(FormSchema::from_value(serde_json::Value::Array(
            descriptor.settings.clone(),
        )))
    }

    /// Colour-annotated tiles in display order.
    ///
    /// A descriptor with an unusable colour is drawn on the fallback colour;
    /// the colour error is returned alongside so it can be reported.
    pub fn tiles(&self) -> (Vec<Tile>, Vec<ColourError>) {
        let mut errors = Vec::new();
        let tiles = self
            .descriptors
            .iter()
            .map(|d| match tile_for(d) {
                Ok(tile) => tile,
                Err(e) => {
                    warn!("Plugin '{}' has {}, using fallback colour", d.name, e);
                    errors.push(e);
                    self.fallback_tile(d)
                }
            })
            .collect();

        (tiles, errors)
    }

    fn fallback_tile(&self, descriptor: &PluginDescriptor) -> Tile {
        let rgb = colour::parse_hex(&self.fallback_colour)
            .unwrap_or(colour::Rgb { r: 0xdd, g: 0xdd, b: 0xdd });

        Tile {
            label: descriptor.name.clone(),
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            display_colour: format!("#{}", rgb.to_hex()),
            text_colour: colour::contrast_text_colour(rgb),
        }
    }
}

/// Sort key for display names: accents and case are ignored first, so
/// `Émile` files between `alpha` and `zeta`; the lowercased name then
/// orders unaccented before accented spellings of the same letters.
pub fn collation_key(name: &str) -> (String, String) {
    let base: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    (base, name.nfc().flat_map(char::to_lowercase).collect())
}

/// Map one descriptor to its tile, failing on a bad colour.
pub fn tile_for(descriptor: &PluginDescriptor) -> Result<Tile, ColourError> {
    let rgb = colour::parse_hex(&descriptor.colour)?;

    Ok(Tile {
        label: descriptor.name.clone(),
        name: descriptor.name.clone(),
        version: descriptor.version.clone(),
        display_colour: format!("#{}", rgb.to_hex()),
        text_colour: colour::contrast_text_colour(rgb),
    })
}

/// Tile grid markup, one tile per entry
pub fn render_tiles(tiles: &[Tile]) -> String {
    tiles
        .iter()
        .map(|tile| {
            format!(
                r#"<div class="tile has-text-centered notification is-3 height-is-200" style="background-color: {bg}" data-name="{name}" data-version="{version}"><p style="color: {fg}">{label}</p></div>"#,
                bg = tile.display_colour,
                fg = tile.text_colour,
                name = escape_html(&tile.name),
                version = escape_html(&tile.version),
                label = escape_html(&tile.label),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colour::{DARK_TEXT, LIGHT_TEXT};

    fn names(directory: &HandshakeDirectory) -> Vec<&str> {
        directory.descriptors().iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn sorts_case_insensitively() {
        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![
            PluginDescriptor::new("banana", "1", "#fff"),
            PluginDescriptor::new("Apple", "1", "#fff"),
            PluginDescriptor::new("cherry", "1", "#fff"),
        ]);
        assert_eq!(names(&directory), vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn accented_names_sort_with_their_base_letter() {
        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![
            PluginDescriptor::new("zeta", "1", "#fff"),
            PluginDescriptor::new("Émile", "1", "#fff"),
            PluginDescriptor::new("alpha", "1", "#fff"),
            PluginDescriptor::new("emile", "1", "#fff"),
            PluginDescriptor::new("Ångström", "1", "#fff"),
        ]);
        assert_eq!(names(&directory), vec!["alpha", "Ångström", "emile", "Émile", "zeta"]);
    }

    #[test]
    fn decomposed_and_composed_accents_share_a_key() {
        assert_eq!(collation_key("E\u{301}mile"), collation_key("Émile"));
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![
            PluginDescriptor::new("plex", "2", "#fff"),
            PluginDescriptor::new("Plex", "1", "#fff"),
            PluginDescriptor::new("PLEX", "3", "#fff"),
        ]);
        let versions: Vec<&str> = directory.descriptors().iter().map(|d| d.version.as_str()).collect();
        assert_eq!(versions, vec!["2", "1", "3"]);
    }

    #[test]
    fn replace_is_a_full_snapshot() {
        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![PluginDescriptor::new("old", "1", "#000")]);
        directory.replace(vec![PluginDescriptor::new("new", "1", "#000")]);
        assert_eq!(names(&directory), vec!["new"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![
            PluginDescriptor::new("plex", "1", "#000"),
            PluginDescriptor::new("plex", "1", "#fff"),
            PluginDescriptor::new("plex", "2", "#fff"),
        ]);
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.find("plex", "1").unwrap().colour, "#000");
    }

    #[test]
    fn tiles_carry_contrast_colours() {
        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![
            PluginDescriptor::new("dark", "1", "#000"),
            PluginDescriptor::new("light", "1", "FFF"),
        ]);
        let (tiles, errors) = directory.tiles();

        assert!(errors.is_empty());
        assert_eq!(tiles[0].display_colour, "#000000");
        assert_eq!(tiles[0].text_colour, LIGHT_TEXT);
        assert_eq!(tiles[1].display_colour, "#ffffff");
        assert_eq!(tiles[1].text_colour, DARK_TEXT);
    }

    #[test]
    fn bad_colour_falls_back() {
        let mut directory = HandshakeDirectory::new("#222");
        directory.replace(vec![PluginDescriptor::new("broken", "1", "#abcd")]);
        let (tiles, errors) = directory.tiles();

        assert_eq!(errors, vec![ColourError::InvalidColour("#abcd".to_string())]);
        assert_eq!(tiles[0].display_colour, "#222222");
        assert_eq!(tiles[0].text_colour, LIGHT_TEXT);
    }

    #[test]
    fn filters_by_component_kind() {
        let mut input = PluginDescriptor::new("spotify", "1", "#1db954");
        input.kinds = vec!["inputs".to_string(), "outputs".to_string()];
        let mut trigger = PluginDescriptor::new("timer", "1", "#123");
        trigger.kinds = vec!["triggers".to_string()];

        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![input, trigger]);

        let outputs: Vec<&str> = directory.for_component("outputs").map(|d| d.name.as_str()).collect();
        assert_eq!(outputs, vec!["spotify"]);
        assert_eq!(directory.for_component("modifiers").count(), 0);
    }

    #[test]
    fn persistent_settings_decode_from_handshake() {
        let mut plex = PluginDescriptor::new("plex", "1", "#e5a00d");
        plex.settings = vec![serde_json::json!({"type": "text", "name": "url", "label": "Server URL"})];

        let mut directory = HandshakeDirectory::new("#dddddd");
        directory.replace(vec![plex, PluginDescriptor::new("bare", "1", "#000")]);

        let schema = directory.persistent_settings("plex", "1").unwrap().unwrap();
        assert_eq!(schema.entries.len(), 1);
        assert!(directory.persistent_settings("bare", "1").is_none());
        assert!(directory.persistent_settings("missing", "1").is_none());
    }

    #[test]
    fn renders_every_tile() {
        let tiles = vec![
            tile_for(&PluginDescriptor::new("a<b", "1", "#000")).unwrap(),
            tile_for(&PluginDescriptor::new("c", "2", "#fff")).unwrap(),
        ];
        let markup = render_tiles(&tiles);

        assert_eq!(markup.matches(r#"<div class="tile"#).count(), 2);
        assert!(markup.contains(r#"<p style="color: #ffffff">a&lt;b</p>"#));
        assert!(markup.contains(r#"background-color: #ffffff" data-name="c""#));
    }
}
