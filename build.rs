//! Build script for RustFind
//!
//! Platform-specific configuration:
//! - Windows: embeds the application manifest for long path support (>260 chars)
//!
//! Windows limits paths to 260 characters (MAX_PATH) by default, which deep
//! trees like `node_modules` routinely exceed. The manifest sets
//! `longPathAware=true`, which together with the Windows 10 v1607+ registry
//! setting raises the limit to 32,767 characters.
//!
//! On non-Windows platforms the script does nothing.

fn main() {
    #[cfg(windows)]
    {
        // embed-resource compiles the .rc file, which references the XML
        // manifest as an RT_MANIFEST resource.
        embed_resource::compile("rustfind.rc", embed_resource::NONE);

        println!("cargo:rerun-if-changed=rustfind.rc");
        println!("cargo:rerun-if-changed=rustfind.manifest");
    }
}
