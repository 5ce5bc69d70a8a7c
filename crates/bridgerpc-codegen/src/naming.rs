//! Naming convention utilities for code generation.
//!
//! | Input | Function | Output |
//! |-------|----------|--------|
//! | `SayHello` | [`lower_first`] | `sayHello` |
//! | `my.app_v1` | [`title_case`] | `My.App_v1` |
//! | `protos/hello.proto` | [`strip_extension`] | `protos/hello` |
//! | `protos/hello` | [`file_stem`] | `hello` |

/// Lower-case the first letter of a string.
///
/// Turns protobuf method names into JavaScript method names.
///
/// # Examples
///
/// ```
/// use bridgerpc_codegen::naming::lower_first;
///
/// assert_eq!(lower_first("SayHello"), "sayHello");
/// assert_eq!(lower_first("ping"), "ping");
/// ```
pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
    }
}

/// Upper-case the first letter of every word.
///
/// A word starts at the beginning of the string or after any character that
/// is not a letter, digit or underscore. Letters inside a word are left alone.
///
/// # Examples
///
/// ```
/// use bridgerpc_codegen::naming::title_case;
///
/// assert_eq!(title_case("my.app"), "My.App");
/// assert_eq!(title_case("acme.rpc_v1"), "Acme.Rpc_v1");
/// ```
pub fn title_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut at_word_start = true;

    for c in s.chars() {
        if at_word_start {
            result.extend(c.to_uppercase());
        } else {
            result.push(c);
        }
        at_word_start = is_word_separator(c);
    }

    result
}

fn is_word_separator(c: char) -> bool {
    if c.is_ascii() {
        return !(c.is_ascii_alphanumeric() || c == '_');
    }
    if c.is_alphanumeric() {
        return false;
    }
    c.is_whitespace()
}

/// Remove the extension of the final path component, keeping directories.
///
/// # Examples
///
/// ```
/// use bridgerpc_codegen::naming::strip_extension;
///
/// assert_eq!(strip_extension("protos/hello.proto"), "protos/hello");
/// assert_eq!(strip_extension("v1.0/README"), "v1.0/README");
/// ```
pub fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) => &path[..name_start + dot],
        None => path,
    }
}

/// Final path component.
///
/// # Examples
///
/// ```
/// use bridgerpc_codegen::naming::file_stem;
///
/// assert_eq!(file_stem("protos/hello"), "hello");
/// assert_eq!(file_stem("hello"), "hello");
/// ```
pub fn file_stem(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Unqualified name of a protobuf type reference.
///
/// # Examples
///
/// ```
/// use bridgerpc_codegen::naming::short_type_name;
///
/// assert_eq!(short_type_name(".my.app.HelloRequest"), "HelloRequest");
/// assert_eq!(short_type_name("Plain"), "Plain");
/// ```
pub fn short_type_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}

#[cfg(test)]
#[path = "naming/naming_tests.rs"]
mod naming_tests;
