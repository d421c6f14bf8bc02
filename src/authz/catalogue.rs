//! Seeded permission catalogue and default profiles.

use crate::errors::{AppError, AppResult};

const MAX_PERMISSION_LEN: usize = 100;

/// Validated permission token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionName(String);

impl PermissionName {
    pub fn parse(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Err(AppError::bad_request("permission name must not be empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(AppError::bad_request("permission name must not contain whitespace"));
        }
        if raw.len() > MAX_PERMISSION_LEN {
            return Err(AppError::bad_request(format!(
                "permission name must be at most {MAX_PERMISSION_LEN} characters"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Resources that get a create/read/update/delete quad, with the noun used
/// in descriptions.
const CRUD_RESOURCES: &[(&str, &str)] = &[
    ("usuarios", "usuários"),
    ("clinicas", "clínicas"),
    ("pacientes", "pacientes"),
    ("profissionais", "profissionais"),
    ("tipos_tratamento", "tipos de tratamento"),
    ("agendamentos", "agendamentos"),
    ("atendimentos", "atendimentos"),
    ("prontuarios", "prontuários médicos"),
    ("documentos", "documentos"),
    ("pastas_documento", "pastas de documentos"),
    ("lancamentos_financeiros", "lançamentos financeiros"),
    ("leads", "leads"),
    ("campanhas_marketing", "campanhas de marketing"),
    ("pesquisas_satisfacao", "pesquisas de satisfação"),
    ("cupons_desconto", "cupons de desconto"),
    ("comissoes", "comissões"),
    ("faturas", "faturas"),
    ("perfis", "perfis"),
    ("permissoes", "permissões"),
];

const MARKERS: &[(&str, &str)] = &[
    ("admin_acesso", "Acesso administrativo total ao sistema."),
    ("profissional_acesso", "Acesso específico para usuários profissionais."),
    ("paciente_acesso", "Acesso específico para usuários pacientes."),
    ("atendente_acesso", "Acesso específico para usuários atendentes."),
    ("coordenador_acesso", "Acesso específico para usuários coordenadores."),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub name: String,
    pub description: String,
}

/// Every permission seeded at setup.
pub fn catalogue() -> Vec<CatalogueEntry> {
    let mut entries: Vec<CatalogueEntry> = MARKERS
        .iter()
        .map(|(name, description)| CatalogueEntry {
            name: (*name).to_string(),
            description: (*description).to_string(),
        })
        .collect();

    for (resource, noun) in CRUD_RESOURCES {
        for (verb, phrase) in [
            ("criar", "Permite criar"),
            ("ler", "Permite visualizar"),
            ("atualizar", "Permite atualizar"),
            ("excluir", "Permite excluir"),
        ] {
            entries.push(CatalogueEntry {
                name: format!("{verb}_{resource}"),
                description: format!("{phrase} {noun}."),
            });
        }
    }

    entries
}

fn quad(resource: &str) -> [String; 4] {
    [
        format!("criar_{resource}"),
        format!("ler_{resource}"),
        format!("atualizar_{resource}"),
        format!("excluir_{resource}"),
    ]
}

/// Default profiles and their permission lists. `ADMIN` receives the whole
/// catalogue.
pub fn default_profiles() -> Vec<(&'static str, Vec<String>)> {
    let admin = catalogue().into_iter().map(|e| e.name).collect();

    let atendente = [
        "atendente_acesso",
        "criar_agendamentos",
        "ler_agendamentos",
        "atualizar_agendamentos",
        "criar_pacientes",
        "ler_pacientes",
        "atualizar_pacientes",
        "criar_atendimentos",
        "ler_atendimentos",
        "atualizar_atendimentos",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let profissional = [
        "profissional_acesso",
        "ler_agendamentos",
        "atualizar_agendamentos",
        "ler_atendimentos",
        "atualizar_atendimentos",
        "criar_prontuarios",
        "ler_prontuarios",
        "atualizar_prontuarios",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let mut coordenador = vec!["coordenador_acesso".to_string()];
    for (resource, _) in CRUD_RESOURCES {
        if matches!(*resource, "perfis" | "permissoes") {
            continue;
        }
        coordenador.extend(quad(resource));
    }

    let paciente = ["paciente_acesso", "ler_agendamentos", "criar_agendamentos"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    vec![
        ("ADMIN", admin),
        ("ATENDENTE", atendente),
        ("PROFISSIONAL", profissional),
        ("COORDENADOR", coordenador),
        (PATIENT_PROFILE, paciente),
    ]
}

/// Profile given to identities provisioned for patients.
pub const PATIENT_PROFILE: &str = "PACIENTE";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_rejects_blank_and_whitespace() {
        assert!(PermissionName::parse("").is_err());
        assert!(PermissionName::parse("   ").is_err());
        assert!(PermissionName::parse("ler pacientes").is_err());
        assert!(PermissionName::parse(&"x".repeat(101)).is_err());
        assert_eq!(PermissionName::parse("ler_pacientes").unwrap().as_str(), "ler_pacientes");
    }

    #[test]
    fn catalogue_names_are_unique_and_valid() {
        let entries = catalogue();
        let names: HashSet<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names.len(), entries.len());
        for entry in &entries {
            assert!(PermissionName::parse(&entry.name).is_ok(), "{}", entry.name);
        }
        assert!(names.contains("admin_acesso"));
        assert!(names.contains("excluir_faturas"));
        assert!(names.contains("ler_permissoes"));
    }

    #[test]
    fn default_profiles_only_reference_catalogue_entries() {
        let names: HashSet<_> = catalogue().into_iter().map(|e| e.name).collect();
        for (profile, perms) in default_profiles() {
            for perm in perms {
                assert!(names.contains(&perm), "{profile} references unknown {perm}");
            }
        }
    }
}
