//! Shared test data builders.

use crate::catalog::CatalogFile;
use crate::job::GroupSelection;

/// A catalog file whose URL is derived from its names.
pub fn catalog_file(group: &str, subgroup: &str, file_name: &str) -> CatalogFile {
    CatalogFile {
        source_url: format!(
            "https://files.example.com/{}/{}/{}",
            group.replace(' ', "-"),
            subgroup.replace(' ', "-"),
            file_name
        ),
        group_name: group.to_string(),
        subgroup_name: subgroup.to_string(),
        file_name: file_name.to_string(),
    }
}

/// A group selection from string slices.
pub fn selection(group_id: &str, subgroup_ids: &[&str]) -> GroupSelection {
    GroupSelection {
        group_id: group_id.to_string(),
        subgroup_ids: subgroup_ids.iter().map(|s| s.to_string()).collect(),
    }
}
