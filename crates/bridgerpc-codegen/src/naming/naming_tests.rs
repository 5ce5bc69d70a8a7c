#![allow(non_snake_case)]

use super::*;
use test_case::test_case;

#[test]
fn lower_first___lowers_only_first_letter() {
    assert_eq!(lower_first("SayHello"), "sayHello");
    assert_eq!(lower_first("URL"), "uRL");
    assert_eq!(lower_first(""), "");
}

#[test_case("my.app", "My.App" ; "dotted package")]
#[test_case("acme.rpc_v1", "Acme.Rpc_v1" ; "underscore continues word")]
#[test_case("foo.bar2baz", "Foo.Bar2baz" ; "digit continues word")]
#[test_case("a-b c", "A-B C" ; "dash and space start words")]
#[test_case("Already.Title", "Already.Title" ; "already title cased")]
#[test_case("", "" ; "empty")]
fn title_case___capitalizes_word_starts(input: &str, expected: &str) {
    assert_eq!(title_case(input), expected);
}

#[test]
fn title_case___keeps_inner_capitals() {
    assert_eq!(title_case("myApp.rpc"), "MyApp.Rpc");
}

#[test_case("hello.proto", "hello" ; "plain file")]
#[test_case("protos/hello.proto", "protos/hello" ; "directory kept")]
#[test_case("a/b.c/hello.v1.proto", "a/b.c/hello.v1" ; "only last extension")]
#[test_case("dir.d/noext", "dir.d/noext" ; "dot in directory only")]
fn strip_extension___removes_final_extension(input: &str, expected: &str) {
    assert_eq!(strip_extension(input), expected);
}

#[test]
fn file_stem___returns_last_component() {
    assert_eq!(file_stem("a/b/hello"), "hello");
    assert_eq!(file_stem("hello"), "hello");
}

#[test]
fn short_type_name___strips_package_qualifier() {
    assert_eq!(short_type_name(".my.app.HelloRequest"), "HelloRequest");
    assert_eq!(short_type_name(".Top"), "Top");
    assert_eq!(short_type_name("Bare"), "Bare");
}
