//! Materializes a [`RawTree`] into an owned [`Message`].
//!
//! Iterative, stack-based rather than recursive: a node's own `Assemble` step is pushed before
//! its dependencies' `Expand` steps, so the shared stack drives a depth-first postorder walk
//! without native call-stack recursion. `rdis`'s protocol tree walk used `async-recursion` for
//! this; that trades a bounded explicit stack for the async call stack, which is the wrong
//! tradeoff here since message trees can be attacker-controlled in depth.

use super::kind::Kind;
use super::message::{AttributeMap, Attributed, Message};
use super::raw::{RawNode, RawTree};

enum Task {
    Expand(u32),
    Assemble { idx: u32, attr_count: usize, child_count: usize },
}

/// Build the owned [`Attributed`] value rooted at `root` in `tree`, resolving scalar payloads
/// against `buf`.
pub fn build(tree: &RawTree, buf: &[u8], root: u32) -> Attributed {
    let mut output: Vec<Attributed> = Vec::new();
    let mut tasks = vec![Task::Expand(root)];

    while let Some(task) = tasks.pop() {
        match task {
            Task::Expand(idx) => {
                let node = tree.node(idx);
                let attrs = tree.attribute_pairs(node);
                let children: &[u32] = if node.kind.is_container() { tree.children(node) } else { &[] };
                tasks.push(Task::Assemble { idx, attr_count: attrs.len(), child_count: children.len() });
                for &a in attrs.iter().rev() {
                    tasks.push(Task::Expand(a));
                }
                for &c in children.iter().rev() {
                    tasks.push(Task::Expand(c));
                }
            }
            Task::Assemble { idx, attr_count, child_count } => {
                let node = *tree.node(idx);
                let attr_vals = output.split_off(output.len() - attr_count);
                let child_vals = output.split_off(output.len() - child_count);

                let attributes = AttributeMap(
                    attr_vals
                        .chunks_exact(2)
                        .map(|pair| (pair[0].value.clone(), pair[1].value.clone()))
                        .collect(),
                );

                let value = if node.is_null() {
                    Message::Null
                } else {
                    match node.kind {
                        Kind::Array => Message::Array(child_vals),
                        Kind::Set => Message::Set(child_vals),
                        Kind::Push => Message::Push(child_vals),
                        Kind::Map => Message::Map(
                            child_vals
                                .chunks_exact(2)
                                .map(|pair| (pair[0].clone(), pair[1].clone()))
                                .collect(),
                        ),
                        _ => build_leaf(&node, buf),
                    }
                };

                output.push(Attributed { attributes, value });
            }
        }
    }

    output.pop().expect("root always produces exactly one value")
}

fn build_leaf(node: &RawNode, buf: &[u8]) -> Message {
    match node.kind {
        Kind::SimpleString => Message::SimpleString(text_string(node, buf)),
        Kind::SimpleError => Message::SimpleError(text_string(node, buf)),
        Kind::Integer => Message::Integer(node.int_value),
        Kind::Double => Message::Double(node.double_value),
        Kind::Boolean => Message::Boolean(node.bool_value),
        Kind::BigNumber => Message::BigNumber(text_string(node, buf)),
        Kind::Null => Message::Null,
        Kind::BulkString => Message::BulkString(text_bytes(node, buf).to_vec()),
        Kind::BulkError => Message::BulkError(text_bytes(node, buf).to_vec()),
        Kind::VerbatimString => {
            let raw = text_bytes(node, buf);
            let format = [raw[0], raw[1], raw[2]];
            let text = String::from_utf8_lossy(&raw[4..]).into_owned();
            Message::VerbatimString { format, text }
        }
        Kind::Array | Kind::Map | Kind::Set | Kind::Push | Kind::Attribute => {
            unreachable!("aggregates are assembled separately")
        }
    }
}

fn text_bytes<'b>(node: &RawNode, buf: &'b [u8]) -> &'b [u8] {
    node.text.map(|r| r.resolve(buf)).unwrap_or(&[])
}

fn text_string(node: &RawNode, buf: &[u8]) -> String {
    String::from_utf8_lossy(text_bytes(node, buf)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp3::parser::{ParseOutcome, Parser};

    fn build_from(bytes: &[u8]) -> Attributed {
        let mut parser = Parser::default();
        let dst = parser.prepare(bytes.len());
        dst.copy_from_slice(bytes);
        parser.commit(bytes.len());
        let ParseOutcome::Ready(root) = parser.parse_one().unwrap() else { panic!("need more") };
        build(parser.tree(), parser.buffer(), root)
    }

    #[test]
    fn builds_simple_string() {
        let attributed = build_from(b"+OK\r\n");
        assert_eq!(attributed.value, Message::SimpleString("OK".into()));
        assert!(attributed.attributes.is_empty());
    }

    #[test]
    fn builds_null_from_null_bulk() {
        let attributed = build_from(b"$-1\r\n");
        assert_eq!(attributed.value, Message::Null);
    }

    #[test]
    fn builds_array_preserving_order() {
        let attributed = build_from(b"*3\r\n:1\r\n:2\r\n:3\r\n");
        match attributed.value {
            Message::Array(items) => {
                let values: Vec<_> = items.into_iter().map(|a| a.value).collect();
                assert_eq!(values, vec![Message::Integer(1), Message::Integer(2), Message::Integer(3)]);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn builds_map_as_pairs() {
        let attributed = build_from(b"%2\r\n+a\r\n:1\r\n+b\r\n:2\r\n");
        match attributed.value {
            Message::Map(pairs) => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs[0].0.value, Message::SimpleString("a".into()));
                assert_eq!(pairs[0].1.value, Message::Integer(1));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn attribute_decorates_its_value_not_the_container() {
        let attributed = build_from(b"*1\r\n|1\r\n+k\r\n+v\r\n:7\r\n");
        match attributed.value {
            Message::Array(items) => {
                assert!(attributed.attributes.is_empty());
                assert_eq!(items[0].value, Message::Integer(7));
                assert_eq!(items[0].attributes.get("k"), Some(&Message::SimpleString("v".into())));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn deeply_nested_array_does_not_blow_the_stack() {
        let depth = 20_000;
        let mut bytes = Vec::new();
        for _ in 0..depth {
            bytes.extend_from_slice(b"*1\r\n");
        }
        bytes.extend_from_slice(b":9\r\n");
        let attributed = build_from(&bytes);
        let mut cur = attributed;
        for _ in 0..depth {
            match cur.value {
                Message::Array(mut items) => cur = items.remove(0),
                other => panic!("expected array, got {other:?}"),
            }
        }
        assert_eq!(cur.value, Message::Integer(9));
    }
}
