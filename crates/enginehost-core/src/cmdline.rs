//! Packaged command-line artifact.
//!
//! Wire format (little-endian): `[i32 argc]` then, per argument, `[i32 len][len bytes UTF-8]`.
//! Every malformed input decodes to an empty list; startup continues without extra arguments.

use std::fs;
use std::path::Path;

use log::{debug, warn};

/// Upper bound for a single argument. Larger declared lengths mean a corrupt artifact.
pub const MAX_ARG_LEN: usize = 65_535;

const XR_MODE_REGULAR: &str = "--xr_mode_regular";
const XR_MODE_OVR: &str = "--xr_mode_ovr";
const USE_DEPTH_32: &str = "--use_depth_32";
const DEBUG_OPENGL: &str = "--debug_opengl";
const USE_IMMERSIVE: &str = "--use_immersive";
const USE_APK_EXPANSION: &str = "--use_apk_expansion";
const APK_EXPANSION_MD5: &str = "--apk_expansion_md5";
const APK_EXPANSION_KEY: &str = "--apk_expansion_key";
const MAIN_PACK: &str = "--main-pack";

/// Decodes the artifact. Returns an empty list on any malformed input.
pub fn decode(bytes: &[u8]) -> Vec<String> {
    match try_decode(bytes) {
        Some(args) => args,
        None => {
            debug!("command line artifact is malformed ({} bytes); using no arguments", bytes.len());
            Vec::new()
        }
    }
}

fn try_decode(bytes: &[u8]) -> Option<Vec<String>> {
    let mut cursor = bytes;

    let argc = read_len(&mut cursor)?;
    // A corrupt count must not turn into a huge allocation.
    let mut args = Vec::with_capacity(argc.min(64));

    for _ in 0..argc {
        let len = read_len(&mut cursor)?;
        if len > MAX_ARG_LEN || cursor.len() < len {
            return None;
        }
        let (raw, rest) = cursor.split_at(len);
        args.push(String::from_utf8_lossy(raw).into_owned());
        cursor = rest;
    }

    Some(args)
}

/// Reads one signed little-endian length field. Negative values are malformed.
fn read_len(cursor: &mut &[u8]) -> Option<usize> {
    if cursor.len() < 4 {
        return None;
    }
    let (head, rest) = cursor.split_at(4);
    *cursor = rest;
    let v = i32::from_le_bytes([head[0], head[1], head[2], head[3]]);
    usize::try_from(v).ok()
}

/// Produces the artifact for `args`. Used by packaging and tests.
pub fn encode<S: AsRef<str>>(args: &[S]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + args.iter().map(|a| 4 + a.as_ref().len()).sum::<usize>());
    out.extend_from_slice(&(args.len() as i32).to_le_bytes());
    for a in args {
        let bytes = a.as_ref().as_bytes();
        out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Reads and decodes the artifact file. A missing or unreadable file yields no arguments.
pub fn decode_file(path: &Path) -> Vec<String> {
    match fs::read(path) {
        Ok(bytes) => decode(&bytes),
        Err(e) => {
            warn!("command line artifact unavailable: path={path:?} err={e}");
            Vec::new()
        }
    }
}

/// Rendering mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Regular,
    Ovr,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Regular => "regular",
            RenderMode::Ovr => "ovr",
        }
    }
}

/// Flags consumed by the bridge. None of them reach the native engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub render_mode: RenderMode,
    pub use_depth_32: bool,
    pub debug_opengl: bool,
    pub use_immersive: bool,
    pub use_apk_expansion: bool,
    pub apk_expansion_md5: Option<String>,
    pub apk_expansion_key: Option<String>,
}

impl LaunchOptions {
    /// The expansion package gates startup only when the flag and both values are present.
    pub fn expansion(&self) -> Option<(&str, &str)> {
        if !self.use_apk_expansion {
            return None;
        }
        match (&self.apk_expansion_md5, &self.apk_expansion_key) {
            (Some(md5), Some(key)) => Some((md5.as_str(), key.as_str())),
            _ => None,
        }
    }
}

/// Command line after merging and flag extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub options: LaunchOptions,
    /// Arguments handed to the native engine, in original relative order.
    pub native_args: Vec<String>,
}

impl CommandLine {
    /// Decoded arguments first, host-injected ones appended, then flags extracted.
    pub fn resolve(decoded: Vec<String>, host_extra: Vec<String>) -> Self {
        let mut all = decoded;
        all.extend(host_extra);
        scan(&all)
    }

    pub fn push_main_pack(&mut self, path: &Path) {
        self.native_args.push(MAIN_PACK.to_string());
        self.native_args.push(path.to_string_lossy().into_owned());
    }
}

/// Extracts recognized flags. Value flags only consume a following token when one exists;
/// blank tokens are dropped.
pub fn scan<S: AsRef<str>>(args: &[S]) -> CommandLine {
    let mut options = LaunchOptions::default();
    let mut native_args = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        let arg = args[i].as_ref();
        let has_value = i + 1 < args.len();

        match arg {
            XR_MODE_REGULAR => options.render_mode = RenderMode::Regular,
            XR_MODE_OVR => options.render_mode = RenderMode::Ovr,
            USE_DEPTH_32 => options.use_depth_32 = true,
            DEBUG_OPENGL => options.debug_opengl = true,
            USE_IMMERSIVE => options.use_immersive = true,
            USE_APK_EXPANSION => options.use_apk_expansion = true,
            APK_EXPANSION_MD5 if has_value => {
                options.apk_expansion_md5 = Some(args[i + 1].as_ref().to_string());
                i += 1;
            }
            APK_EXPANSION_KEY if has_value => {
                options.apk_expansion_key = Some(args[i + 1].as_ref().to_string());
                i += 1;
            }
            other if !other.trim().is_empty() => native_args.push(other.to_string()),
            _ => {}
        }
        i += 1;
    }

    CommandLine {
        options,
        native_args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn encode_decode_round_trip() {
        let args = strings(&["--path", "res://main.tscn", "", "ünïcødé", "--verbose"]);
        assert_eq!(decode(&encode(&args)), args);
    }

    #[test]
    fn empty_list_round_trips() {
        let args: Vec<String> = Vec::new();
        assert_eq!(encode(&args), vec![0, 0, 0, 0]);
        assert!(decode(&encode(&args)).is_empty());
    }

    #[test]
    fn every_truncation_decodes_to_empty() {
        let blob = encode(&strings(&["alpha", "beta", "gamma"]));
        for cut in 0..blob.len() {
            assert!(decode(&blob[..cut]).is_empty(), "cut at {cut} produced arguments");
        }
        assert_eq!(decode(&blob).len(), 3);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&1i32.to_le_bytes());
        blob.extend_from_slice(&((MAX_ARG_LEN as i32) + 1).to_le_bytes());
        blob.extend(std::iter::repeat(b'a').take(MAX_ARG_LEN + 1));
        assert!(decode(&blob).is_empty());
    }

    #[test]
    fn max_length_argument_is_accepted() {
        let long = "x".repeat(MAX_ARG_LEN);
        assert_eq!(decode(&encode(&[long.as_str()])), vec![long]);
    }

    #[test]
    fn negative_fields_are_malformed() {
        assert!(decode(&(-1i32).to_le_bytes()).is_empty());

        let mut blob = Vec::new();
        blob.extend_from_slice(&1i32.to_le_bytes());
        blob.extend_from_slice(&(-4i32).to_le_bytes());
        assert!(decode(&blob).is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&1i32.to_le_bytes());
        blob.extend_from_slice(&2i32.to_le_bytes());
        blob.extend_from_slice(&[0xff, b'a']);
        assert_eq!(decode(&blob), vec!["\u{fffd}a".to_string()]);
    }

    #[test]
    fn missing_file_yields_no_arguments() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_file(&dir.path().join("_cl_")).is_empty());
    }

    #[test]
    fn scan_strips_recognized_flags_and_keeps_order() {
        let cl = scan(&[
            "--use_depth_32",
            "--path",
            "--xr_mode_ovr",
            "res://a",
            "--debug_opengl",
            "--use_immersive",
            "   ",
            "--apk_expansion_md5",
            "abc",
            "--use_apk_expansion",
            "--apk_expansion_key",
            "KEY",
            "--verbose",
        ]);

        assert_eq!(cl.native_args, strings(&["--path", "res://a", "--verbose"]));
        assert_eq!(cl.options.render_mode, RenderMode::Ovr);
        assert!(cl.options.use_depth_32);
        assert!(cl.options.debug_opengl);
        assert!(cl.options.use_immersive);
        assert_eq!(cl.options.expansion(), Some(("abc", "KEY")));
    }

    #[test]
    fn trailing_value_flag_passes_through() {
        let cl = scan(&["--verbose", "--apk_expansion_key"]);
        assert_eq!(cl.native_args, strings(&["--verbose", "--apk_expansion_key"]));
        assert_eq!(cl.options.apk_expansion_key, None);
    }

    #[test]
    fn expansion_requires_flag_and_both_values() {
        let cl = scan(&["--apk_expansion_md5", "abc", "--apk_expansion_key", "k"]);
        assert_eq!(cl.options.expansion(), None);
    }

    #[test]
    fn host_arguments_are_appended_before_scanning() {
        let cl = CommandLine::resolve(strings(&["a", "--use_immersive"]), strings(&["b", "--debug_opengl"]));
        assert_eq!(cl.native_args, strings(&["a", "b"]));
        assert!(cl.options.use_immersive);
        assert!(cl.options.debug_opengl);
    }

    #[test]
    fn main_pack_is_appended() {
        let mut cl = scan(&["a"]);
        cl.push_main_pack(Path::new("/data/main.obb"));
        assert_eq!(cl.native_args, strings(&["a", "--main-pack", "/data/main.obb"]));
    }
}
