//! Reply text.
//!
//! User-facing strings live here, in the Portuguese the assistant speaks.
//! Handlers only assemble rows into these templates.

use crate::data::Row;

/// Rows shown inline before a listing is truncated.
pub const LISTING_LIMIT: usize = 20;

pub const MENU: &str = "1 - Medicamentos \n 2 - Turismo \n 3 - Unidades de Saúde \n 4 - Telecentros \n 5 - Unidades de Segurança \n 6 - Medicamentos por Bairro";

pub const MEDICINE_PROMPT: &str =
    "Digite o nome do medicamento que você está procurando nas farmácias da prefeitura";

pub const TOURISM_MENU: &str = "Escolha uma das opções de turismo:\n\n1 - Teatro\n2 - Restaurante";

pub const TOURISM_INVALID: &str =
    "Opção inválida. Por favor, escolha 1 para Teatro ou 2 para Restaurante.";

pub const RESTAURANT_STUB: &str =
    "Função de restaurantes ainda não implementada. Por favor, escolha outra opção.";

pub const THEATRES_EMPTY: &str = "Nenhum teatro encontrado na base de dados.";

pub const MAP_OFFER: &str = "Deseja ver no mapa o endereço encontrado? Responda \"sim\" ou \"não\".";

pub const MAP_CONFIRM_REPROMPT: &str = "Por favor, digite \"sim\" ou \"não\".";

pub const MAP_NO_ADDRESS: &str = "Não foi possível encontrar o endereço para gerar o mapa.";

pub const FAREWELL: &str = "Entendido! Se precisar de mais ajuda, é só chamar.";

pub const GENERIC_ERROR: &str =
    "Ocorreu um erro ao processar sua solicitação. Por favor, tente novamente.";

pub fn welcome(first_name: Option<&str>) -> String {
    let greeting = match first_name {
        Some(name) => format!("Olá! {name}, Sou"),
        None => "Olá! Sou".to_string(),
    };
    format!(
        "{greeting} o assistente virtual da Prefeitura do Recife. \
        Como posso ajudá-lo hoje? Por favor, digite uma das opções abaixo:\n\n {MENU}"
    )
}

pub fn medicine_results(rows: &[Row]) -> String {
    let mut reply = String::from("Medicamento encontrado:\n");
    for row in rows {
        reply.push_str(&format!(
            "\nNome: {}\nEndereço da Farmácia: {}\nDosagem: {}\n",
            row.get_or_unspecified("medicamento"),
            row.get_or_unspecified("endereco"),
            row.get_or_unspecified("dosagem"),
        ));
    }
    reply
}

pub fn medicine_not_found(name: &str) -> String {
    format!("Desculpe, não encontramos o medicamento \"{name}\" em nosso estoque.")
}

pub fn theatre_list(rows: &[Row]) -> String {
    let mut reply = format!(
        "Aqui estão {} teatros sorteados para você visitar:\n",
        rows.len()
    );
    for (index, row) in rows.iter().enumerate() {
        reply.push_str(&format!(
            "\n{}. {}: {}\n",
            index + 1,
            row.get_or_unspecified("nome"),
            row.get_or_unspecified("descricao"),
        ));
    }
    reply
}

pub fn map_caption(address: &str) -> String {
    format!("Mapa para {address}")
}

/// A capped listing: at most [`LISTING_LIMIT`] rows, with a "showing first
/// 20 of N" suffix when truncated. `noun` is the counted noun phrase for
/// the suffix ("unidades encontradas", "registros encontrados", ...).
pub fn capped_listing<F>(title: &str, rows: &[Row], noun: &str, format_row: F) -> String
where
    F: Fn(usize, &Row) -> String,
{
    let mut reply = format!("{title}\n");
    for (index, row) in rows.iter().take(LISTING_LIMIT).enumerate() {
        reply.push_str(&format_row(index + 1, row));
    }
    if rows.len() > LISTING_LIMIT {
        reply.push_str(&format!(
            "\n\nMostrando apenas os primeiros {LISTING_LIMIT} de {} {noun}.",
            rows.len()
        ));
    }
    reply
}
