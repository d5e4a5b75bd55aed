use crate::pose::{constants::EDGE_LIST, Joint};

/// Directed edges leaving `joint`, as `(edge_id, target)` in edge order.
///
/// `edge_id` indexes [`EDGE_LIST`]: ids below the edge count are forward
/// edges, the rest backward.
pub(super) fn neighbors(joint: Joint) -> impl Iterator<Item = (usize, Joint)> {
    let edges: &'static [(Joint, Joint)] = &EDGE_LIST;
    edges
        .iter()
        .enumerate()
        .filter(move |&(_, &(source, _))| source == joint)
        .map(|(edge_id, &(_, target))| (edge_id, target))
}
