use crate::error::Kind;
use crate::guest::link::clean;
use crate::guest::normalize_link_target;

#[test]
fn clean_collapses_dots_and_separators() {
    assert_eq!(clean("/a//b/./c"), "/a/b/c");
    assert_eq!(clean("/a/b/../c"), "/a/c");
    assert_eq!(clean("/../.."), "/");
    assert_eq!(clean(""), "/");
}

#[test]
fn allowed_prefix_is_stripped_and_cleaned() {
    let out = normalize_link_target("dir/link", "/ipfs/QmRoot//sub/./x", "/ipfs/").unwrap();
    assert_eq!(out, "/QmRoot/sub/x");
}

#[test]
fn ipns_prefix_is_allowed_for_ipns_guests() {
    let out = normalize_link_target("name/link", "/ipns/other-name", "/ipns/").unwrap();
    assert_eq!(out, "/other-name");
}

#[test]
fn bare_slash_is_the_guest_root() {
    let out = normalize_link_target("dir/link", "/", "/ipfs/").unwrap();
    assert_eq!(out, "/");
}

#[test]
fn dot_dot_yields_the_parent_of_the_link() {
    let out = normalize_link_target("a/b/link", "..", "/ipfs/").unwrap();
    assert_eq!(out, "/a/b");
}

#[test]
fn dot_yields_the_link_itself() {
    let out = normalize_link_target("a/b/link", ".", "/ipfs/").unwrap();
    assert_eq!(out, "/a/b/link");
}

#[test]
fn absolute_target_outside_namespace_is_invalid() {
    let err = normalize_link_target("dir/link", "/etc/passwd", "/ipfs/").unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidItem);
}

#[test]
fn relative_target_joins_against_the_link_path() {
    let out = normalize_link_target("a/b/link", "../sibling", "/ipfs/").unwrap();
    assert_eq!(out, "/a/sibling");
}

#[test]
fn relative_escape_stops_at_root() {
    let out = normalize_link_target("link", "../../../..", "/ipfs/").unwrap();
    assert_eq!(out, "/");
}
