//! Local de Bruijn graph compaction
//!
//! A [`Graph`] holds the vertices of one bucket. Each vertex is node text
//! (bases, possibly with tag references in its interior) plus the minimizer
//! ranks of its first and last (k-1)-mers.
//!
//! [`Graph::compact`] merges vertices along unambiguous (k-1)-overlaps whose
//! minimizer is the bucket id. Every vertex with such an end lives in the
//! bucket when it is processed, so an overlap that looks unambiguous here is
//! unambiguous in the whole graph. Overlaps are matched in both orientations.
//!
//! Absorbed vertices keep an empty sequence and are skipped by
//! [`Graph::nodes`] consumers.

use ahash::AHashMap;
use thiserror::Error;
use tracing::trace;

use crate::encoding::{reverse_complement, validate_dna_sequence, EncodingError};

/// Errors raised by the compaction engine
#[derive(Debug, Error)]
pub enum GraphError {
    /// Vertices and minimizers were not added in lockstep
    #[error("Graph has {vertices} vertices but {leftmins} left and {rightmins} right minimizers")]
    MinimizerCount {
        /// Number of vertices
        vertices: usize,
        /// Number of left minimizers
        leftmins: usize,
        /// Number of right minimizers
        rightmins: usize,
    },

    /// A vertex is too short to have two (k-1)-mer ends
    #[error("Vertex {index} has length {len}, shorter than k = {k}")]
    ShortVertex {
        /// Vertex index
        index: usize,
        /// Vertex length
        len: usize,
        /// k-mer length
        k: usize,
    },

    /// A vertex end is not plain DNA
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Identifier of a node that survived compaction, unique across buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    /// Bucket that produced the node
    pub bucket: u64,
    /// Dense index among the bucket's surviving nodes
    pub index: u64,
}

/// Borrowed view of one node
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    /// Identifier, once [`Graph::renumber`] ran
    pub id: Option<NodeId>,
    /// Node text, empty if the node was absorbed
    pub sequence: &'a [u8],
    /// Minimizer rank of the first (k-1)-mer
    pub leftmin: u64,
    /// Minimizer rank of the last (k-1)-mer
    pub rightmin: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct End {
    node: usize,
    side: Side,
}

/// Vertex set of one bucket
#[derive(Debug, Clone)]
pub struct Graph {
    k: usize,
    sequences: Vec<Vec<u8>>,
    leftmins: Vec<u64>,
    rightmins: Vec<u64>,
    ids: Vec<Option<NodeId>>,
}

impl Graph {
    /// Create an empty graph for k-mers of length `k`
    pub fn new(k: usize) -> Self {
        Self {
            k,
            sequences: Vec::new(),
            leftmins: Vec::new(),
            rightmins: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Number of vertices, absorbed ones included
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// True if no vertex was added
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Add a vertex; its minimizers follow with the two calls below
    pub fn add_vertex(&mut self, sequence: Vec<u8>) {
        self.sequences.push(sequence);
        self.ids.push(None);
    }

    /// Minimizer of the first (k-1)-mer of the last added vertex
    pub fn add_left_minimizer(&mut self, rank: u64) {
        self.leftmins.push(rank);
    }

    /// Minimizer of the last (k-1)-mer of the last added vertex
    pub fn add_right_minimizer(&mut self, rank: u64) {
        self.rightmins.push(rank);
    }

    /// Merge vertices along unambiguous overlaps whose minimizer is `bucket`
    pub fn compact(&mut self, bucket: u64) -> Result<(), GraphError> {
        let n = self.sequences.len();
        if self.leftmins.len() != n || self.rightmins.len() != n {
            return Err(GraphError::MinimizerCount {
                vertices: n,
                leftmins: self.leftmins.len(),
                rightmins: self.rightmins.len(),
            });
        }

        let links = self.link_ends(bucket)?;
        if links.is_empty() {
            return Ok(());
        }

        let overlap = self.k - 1;
        let mut visited = vec![false; n];
        let mut num_merged = 0usize;
        for first in 0..n {
            if visited[first] || self.sequences[first].is_empty() {
                continue;
            }

            // walk left to the chain start; a cycle starts at `first`
            let (mut start, mut start_forward) = (first, true);
            loop {
                let outer = if start_forward { Side::Left } else { Side::Right };
                let Some(prev) = links.get(&End { node: start, side: outer }) else {
                    break;
                };
                if prev.node == first {
                    (start, start_forward) = (first, true);
                    break;
                }
                start = prev.node;
                start_forward = prev.side == Side::Right;
            }

            visited[start] = true;
            let mut merged = self.oriented(start, start_forward)?;
            let leftmin = self.boundary_minimizer(start, start_forward, Side::Left);
            let (mut last, mut last_forward) = (start, start_forward);
            loop {
                let outer = if last_forward { Side::Right } else { Side::Left };
                let Some(next) = links.get(&End { node: last, side: outer }) else {
                    break;
                };
                if visited[next.node] {
                    break;
                }
                let next_forward = next.side == Side::Left;
                let text = self.oriented(next.node, next_forward)?;
                merged.extend_from_slice(&text[overlap..]);
                visited[next.node] = true;
                self.sequences[next.node].clear();
                (last, last_forward) = (next.node, next_forward);
                num_merged += 1;
            }

            if last != start {
                let rightmin = self.boundary_minimizer(last, last_forward, Side::Right);
                self.sequences[start] = merged;
                self.leftmins[start] = leftmin;
                self.rightmins[start] = rightmin;
            }
        }

        trace!("Bucket {}: {} vertices absorbed", bucket, num_merged);
        Ok(())
    }

    /// Give every surviving node a dense id within `bucket`
    pub fn renumber(&mut self, bucket: u64) {
        let mut index = 0u64;
        for (sequence, id) in self.sequences.iter().zip(self.ids.iter_mut()) {
            if sequence.is_empty() {
                *id = None;
            } else {
                *id = Some(NodeId { bucket, index });
                index += 1;
            }
        }
        trace!("Bucket {}: renumbered {} nodes", bucket, index);
    }

    /// All nodes in insertion order, absorbed ones included
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> + '_ {
        (0..self.sequences.len()).map(move |i| NodeRef {
            id: self.ids[i],
            sequence: &self.sequences[i],
            leftmin: self.leftmins.get(i).copied().unwrap_or_default(),
            rightmin: self.rightmins.get(i).copied().unwrap_or_default(),
        })
    }

    /// Pair up the ends that meet through an unambiguous non-palindromic overlap
    fn link_ends(&self, bucket: u64) -> Result<AHashMap<End, End>, GraphError> {
        let overlap = self.k - 1;
        // canonical overlap -> ends seeing it forward, ends seeing it reversed
        let mut groups: AHashMap<Vec<u8>, (Vec<End>, Vec<End>)> = AHashMap::new();

        for (index, sequence) in self.sequences.iter().enumerate() {
            if sequence.is_empty() {
                continue;
            }
            if sequence.len() < self.k {
                return Err(GraphError::ShortVertex { index, len: sequence.len(), k: self.k });
            }
            for side in [Side::Left, Side::Right] {
                let minimizer = match side {
                    Side::Left => self.leftmins[index],
                    Side::Right => self.rightmins[index],
                };
                if minimizer != bucket {
                    continue;
                }
                let end = match side {
                    Side::Left => &sequence[..overlap],
                    Side::Right => &sequence[sequence.len() - overlap..],
                };
                validate_dna_sequence(end)?;
                // a right end points out of its (k-1)-mer, a left end into it
                let directed = match side {
                    Side::Right => end.to_vec(),
                    Side::Left => reverse_complement(end)?,
                };
                let flipped = reverse_complement(&directed)?;
                if directed == flipped {
                    continue;
                }
                let (key, forward) = if directed < flipped {
                    (directed, true)
                } else {
                    (flipped, false)
                };
                let group = groups.entry(key).or_default();
                let end = End { node: index, side };
                if forward {
                    group.0.push(end);
                } else {
                    group.1.push(end);
                }
            }
        }

        let mut links = AHashMap::new();
        for (outgoing, incoming) in groups.into_values() {
            if let ([a], [b]) = (outgoing.as_slice(), incoming.as_slice()) {
                if a.node != b.node {
                    links.insert(*a, *b);
                    links.insert(*b, *a);
                }
            }
        }
        Ok(links)
    }

    fn oriented(&self, node: usize, forward: bool) -> Result<Vec<u8>, GraphError> {
        if forward {
            Ok(self.sequences[node].clone())
        } else {
            Ok(reverse_complement(&self.sequences[node])?)
        }
    }

    /// Minimizer of the `side` end of `node` as read in the given orientation
    fn boundary_minimizer(&self, node: usize, forward: bool, side: Side) -> u64 {
        match (side, forward) {
            (Side::Left, true) | (Side::Right, false) => self.leftmins[node],
            (Side::Right, true) | (Side::Left, false) => self.rightmins[node],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(k: usize, vertices: &[(&[u8], u64, u64)]) -> Graph {
        let mut g = Graph::new(k);
        for &(seq, left, right) in vertices {
            g.add_vertex(seq.to_vec());
            g.add_left_minimizer(left);
            g.add_right_minimizer(right);
        }
        g
    }

    fn surviving(g: &Graph) -> Vec<(Vec<u8>, u64, u64)> {
        g.nodes()
            .filter(|n| !n.sequence.is_empty())
            .map(|n| (n.sequence.to_vec(), n.leftmin, n.rightmin))
            .collect()
    }

    #[test]
    fn test_forward_merge() {
        let mut g = graph(4, &[(b"aaac", 1, 7), (b"aacg", 7, 9)]);
        g.compact(7).unwrap();
        assert_eq!(surviving(&g), vec![(b"aaacg".to_vec(), 1, 9)]);
    }

    #[test]
    fn test_merge_with_reverse_complement() {
        // cgtt is the reverse complement of aacg
        let mut g = graph(4, &[(b"aaac", 1, 7), (b"cgtt", 9, 7)]);
        g.compact(7).unwrap();
        assert_eq!(surviving(&g), vec![(b"aaacg".to_vec(), 1, 9)]);
    }

    #[test]
    fn test_merge_starts_from_chain_head() {
        let mut g = graph(4, &[(b"aacg", 7, 7), (b"aaac", 1, 7), (b"acgt", 7, 3)]);
        g.compact(7).unwrap();
        assert_eq!(surviving(&g), vec![(b"aaacgt".to_vec(), 1, 3)]);
    }

    #[test]
    fn test_no_merge_on_other_minimizer() {
        let mut g = graph(4, &[(b"aaac", 1, 7), (b"aacg", 7, 9)]);
        g.compact(8).unwrap();
        assert_eq!(surviving(&g).len(), 2);
    }

    #[test]
    fn test_no_merge_on_branch() {
        let mut g = graph(4, &[(b"aaac", 1, 7), (b"aacg", 7, 9), (b"aact", 7, 9)]);
        g.compact(7).unwrap();
        assert_eq!(surviving(&g).len(), 3);
    }

    #[test]
    fn test_no_merge_on_self_loop_or_palindrome() {
        let mut g = graph(4, &[(b"aaaa", 0, 0)]);
        g.compact(0).unwrap();
        assert_eq!(surviving(&g), vec![(b"aaaa".to_vec(), 0, 0)]);

        // "acgt" reads the same on both strands
        let mut g = graph(5, &[(b"gacgt", 2, 4), (b"acgtc", 4, 6)]);
        g.compact(4).unwrap();
        assert_eq!(surviving(&g).len(), 2);
    }

    #[test]
    fn test_cycle_is_broken_at_first_node() {
        let mut g = graph(
            3,
            &[(b"aac", 0, 0), (b"aca", 0, 0), (b"cag", 0, 0), (b"aga", 0, 0), (b"gaa", 0, 0)],
        );
        g.compact(0).unwrap();
        assert_eq!(surviving(&g), vec![(b"aacagaa".to_vec(), 0, 0)]);
    }

    #[test]
    fn test_tag_references_are_kept() {
        let mut g = graph(4, &[(b"aaac+0+gaac", 1, 7), (b"aacg", 7, 9)]);
        g.compact(7).unwrap();
        assert_eq!(surviving(&g), vec![(b"aaac+0+gaacg".to_vec(), 1, 9)]);

        let mut g = graph(4, &[(b"cgtt", 9, 7), (b"aaac+0+gaac", 1, 7)]);
        g.compact(7).unwrap();
        assert_eq!(surviving(&g), vec![(b"cgttc-0-gttt".to_vec(), 9, 1)]);
    }

    #[test]
    fn test_renumber() {
        let mut g = graph(4, &[(b"aaac", 1, 7), (b"aacg", 7, 9), (b"tttt", 5, 5)]);
        g.compact(7).unwrap();
        g.renumber(12);
        let ids: Vec<_> = g.nodes().map(|n| n.id).collect();
        assert_eq!(
            ids,
            vec![
                Some(NodeId { bucket: 12, index: 0 }),
                None,
                Some(NodeId { bucket: 12, index: 1 }),
            ]
        );
    }

    #[test]
    fn test_compact_errors() {
        let mut g = Graph::new(4);
        g.add_vertex(b"aaac".to_vec());
        g.add_left_minimizer(1);
        assert!(matches!(g.compact(1), Err(GraphError::MinimizerCount { .. })));

        let mut g = graph(4, &[(b"aac", 1, 1)]);
        assert!(matches!(g.compact(1), Err(GraphError::ShortVertex { index: 0, len: 3, k: 4 })));
    }
}
