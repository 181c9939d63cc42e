pub mod lineage_path;
pub mod partner_match;
pub mod primitives;
pub mod relatives;

pub use lineage_path::{LineageNode, LineagePathFinder, LineagePathResult};
pub use partner_match::{ExplorationNode, PartnerMatchFinder, PartnerMatchRequest, PartnerMatchResult};
pub use primitives::{explore, ActiveEdges, EdgeFilter, NodeFilter, NodeFilterSet, SearchTree};
pub use relatives::{DepthMode, RelativeInfo, RelativesFinder, RelativesRequest, RelativesResult};
