//! Position-set matcher over compiled tokens.
//!
//! Each token maps the set of input offsets reachable so far to the set
//! reachable after it. The input matches when its full length is reachable
//! once every token has been applied. Work is bounded by
//! `tokens * input_len^2` in the worst case and needs no backtracking.

use super::compiler::{is_word, Token};

pub(crate) fn is_match(tokens: &[Token], input: &str) -> bool {
    let input = input.as_bytes();
    let mut reachable = vec![false; input.len() + 1];
    reachable[0] = true;

    for token in tokens {
        reachable = step(token, input, &reachable);
        if !reachable.contains(&true) {
            return false;
        }
    }

    reachable[input.len()]
}

fn step(token: &Token, input: &[u8], reachable: &[bool]) -> Vec<bool> {
    let mut next = vec![false; reachable.len()];
    let starts = reachable
        .iter()
        .enumerate()
        .filter_map(|(pos, &hit)| hit.then_some(pos));

    match token {
        Token::Literal(literal) => {
            for pos in starts {
                if let Some(end) = match_literal(input, pos, literal) {
                    next[end] = true;
                }
            }
        }
        Token::Alternation(variants) => {
            for pos in starts {
                for variant in variants {
                    if let Some(end) = match_literal(input, pos, variant) {
                        next[end] = true;
                    }
                }
            }
        }
        Token::Segment => {
            for pos in starts {
                next[pos] = true;
                let mut end = pos;
                while end < input.len() && is_word(input[end]) {
                    end += 1;
                    next[end] = true;
                }
            }
        }
        Token::Components => {
            let mut pending: Vec<usize> = starts.collect();
            for &pos in &pending {
                next[pos] = true;
            }

            while let Some(pos) = pending.pop() {
                let mut heads = vec![pos];
                if input.get(pos) == Some(&b'#') {
                    heads.push(pos + 1);
                }
                if input[pos..].starts_with(b"::") {
                    heads.push(pos + 2);
                }

                for head in heads {
                    let mut end = head;
                    while end < input.len() && is_word(input[end]) {
                        end += 1;
                        if !next[end] {
                            next[end] = true;
                            pending.push(end);
                        }
                    }
                }
            }
        }
    }

    next
}

fn match_literal(input: &[u8], pos: usize, literal: &str) -> Option<usize> {
    let end = pos + literal.len();
    let window = input.get(pos..end)?;
    window.eq_ignore_ascii_case(literal.as_bytes()).then_some(end)
}
